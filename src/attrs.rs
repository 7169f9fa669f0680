use std::collections::HashMap;

/// Multi-valued, order-preserving string mapping. Once a name appears it
/// always has at least one value (values may be the empty string) — see
/// the Attrs invariant in the data model.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attrs {
    order: Vec<String>,
    values: HashMap<String, Vec<String>>,
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` to `attrs[name]`, creating the entry if absent.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.values.get_mut(&name) {
            Some(values) => values.push(value),
            None => {
                self.order.push(name.clone());
                self.values.insert(name, vec![value]);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// `true` if the attribute is present with a "truthy" value: no value,
    /// or any value other than `"false"`/`"0"`.
    pub fn is_set(&self, name: &str) -> bool {
        match self.get(name) {
            None => false,
            Some(values) => values
                .last()
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.order
            .iter()
            .map(move |name| (name.as_str(), self.values[name].as_slice()))
    }

    /// Append every value of `other` onto `self`, preserving `other`'s
    /// internal order — this is the merge semantics Calls use when two
    /// call-sites target the same Task (§4.4).
    pub fn merge(&mut self, other: &Attrs) {
        for (name, values) in other.iter() {
            for value in values {
                self.append(name, value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_insertion_order() {
        let mut attrs = Attrs::new();
        attrs.append("b", "1");
        attrs.append("a", "2");
        attrs.append("b", "3");
        let collected: Vec<_> = attrs.iter().map(|(n, _)| n).collect();
        assert_eq!(collected, vec!["b", "a"]);
        assert_eq!(attrs.get("b"), Some(&["1".to_string(), "3".to_string()][..]));
    }

    #[test]
    fn merge_appends_in_order() {
        let mut a = Attrs::new();
        a.append("x", "1");
        let mut b = Attrs::new();
        b.append("x", "2");
        b.append("y", "3");
        a.merge(&b);
        assert_eq!(a.get("x"), Some(&["1".to_string(), "2".to_string()][..]));
        assert_eq!(a.get("y"), Some(&["3".to_string()][..]));
    }

    #[test]
    fn is_set_treats_false_and_zero_as_falsy() {
        let mut attrs = Attrs::new();
        attrs.append("if-present", "false");
        assert!(!attrs.is_set("if-present"));
        attrs.append("if-present", "true");
        assert!(attrs.is_set("if-present"));
    }
}
