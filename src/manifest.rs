//! Package manifest model (§6): `{ name?, scripts? }` loaded from a
//! package location. Unknown extra fields are ignored by `serde`'s default
//! deny-nothing behavior (no `deny_unknown_fields`).

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub name: Option<String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

/// Alias derivation for a manifest name (§3): the full name is always
/// first; a `@scope/name` form additionally yields the unscoped
/// `name`/`name/subPackage` split, with `subPackageName` set whenever the
/// unscoped remainder itself contains a `/`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameDerivation {
    pub aliases: Vec<String>,
    pub sub_package_name: Option<String>,
}

pub fn derive_name(full_name: &str) -> NameDerivation {
    let mut aliases = vec![full_name.to_string()];

    let unscoped = if let Some(rest) = full_name.strip_prefix('@') {
        match rest.find('/') {
            Some(slash) => &rest[slash + 1..],
            None => full_name,
        }
    } else {
        full_name
    };

    let sub_package_name = match unscoped.find('/') {
        Some(slash) => {
            let base = &unscoped[..slash];
            let sub = unscoped[slash + 1..].to_string();
            if !aliases.contains(&base.to_string()) {
                aliases.push(base.to_string());
            }
            Some(sub)
        }
        None => {
            if !aliases.contains(&unscoped.to_string()) {
                aliases.push(unscoped.to_string());
            }
            None
        }
    };

    NameDerivation { aliases, sub_package_name }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name_has_a_single_alias() {
        let d = derive_name("widget");
        assert_eq!(d.aliases, vec!["widget"]);
        assert_eq!(d.sub_package_name, None);
    }

    #[test]
    fn scoped_name_yields_unscoped_alias() {
        let d = derive_name("@acme/widget");
        assert_eq!(d.aliases, vec!["@acme/widget", "widget"]);
        assert_eq!(d.sub_package_name, None);
    }

    #[test]
    fn scoped_nested_name_yields_sub_package() {
        let d = derive_name("@acme/widget/gears");
        assert_eq!(d.aliases, vec!["@acme/widget/gears", "widget"]);
        assert_eq!(d.sub_package_name, Some("gears".to_string()));
    }

    #[test]
    fn unscoped_nested_name_yields_sub_package() {
        let d = derive_name("widget/gears");
        assert_eq!(d.aliases, vec!["widget/gears", "widget"]);
        assert_eq!(d.sub_package_name, Some("gears".to_string()));
    }
}
