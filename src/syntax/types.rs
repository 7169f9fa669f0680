//! Candidate/reader vocabulary for the option/syntax engine (§4.2).

/// The syntactic family a candidate belongs to, used to pick the
/// wildcard reader key (`--*` / `-*` / `*`) when no exact reader exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Long,
    Short,
    Positional,
}

impl Category {
    pub fn wildcard_key(self) -> &'static str {
        match self {
            Category::Long => "--*",
            Category::Short => "-*",
            Category::Positional => "*",
        }
    }
}

/// One interpretation of the current argv position, produced by a
/// [`SyntaxHandler`]. `name` is the option name results get recorded
/// under; `lookup_key` is what the reader table is actually searched for
/// (they differ for the one-letter-prefix-with-param form, which records
/// under `-t` but is looked up under the decorated key `-t*`, §4.2).
/// `values` are any values the syntax form itself already captured (e.g.
/// the part after `=`); `next_tail` is the argv remaining once this
/// candidate's name has been taken off the front.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub name: String,
    pub lookup_key: String,
    pub values: Vec<String>,
    pub next_tail: Vec<String>,
    pub retry: bool,
    pub category: Category,
}

/// What a matched reader does with a candidate: consume some number of
/// following values, consume everything left, or just flag presence.
/// `Defer` registers the option for the second pass instead of
/// finalizing it immediately (§4.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReaderKind {
    Values(usize),
    Rest,
    Flag,
    Defer,
}

pub type SyntaxHandler = Box<dyn Fn(&[String]) -> Vec<Candidate> + Send + Sync>;

fn looks_like_option(token: &str) -> bool {
    token.starts_with('-')
}

/// `--name` or `--name=value`.
pub fn long_option_handler(tail: &[String]) -> Vec<Candidate> {
    let Some(token) = tail.first() else { return Vec::new() };
    if !token.starts_with("--") {
        return Vec::new();
    }
    let (name, values) = match token.split_once('=') {
        Some((n, v)) => (n.to_string(), vec![v.to_string()]),
        None => (token.clone(), Vec::new()),
    };
    vec![Candidate {
        lookup_key: name.clone(),
        name,
        values,
        next_tail: tail[1..].to_vec(),
        retry: false,
        category: Category::Long,
    }]
}

/// Short options: exact full-token match, one-letter-plus-inline-param,
/// and one-letter-plus-cluster-continuation, tried in that preference
/// order (§4.2, "short-option disambiguation").
pub fn short_option_handler(tail: &[String]) -> Vec<Candidate> {
    let Some(token) = tail.first() else { return Vec::new() };
    if token.starts_with("--") || !looks_like_option(token) || token.len() < 2 {
        return Vec::new();
    }
    let rest_tail = tail[1..].to_vec();
    let mut candidates = Vec::new();

    // Exact: the whole token might itself be a registered option name.
    candidates.push(Candidate {
        lookup_key: token.clone(),
        name: token.clone(),
        values: Vec::new(),
        next_tail: rest_tail.clone(),
        retry: false,
        category: Category::Short,
    });

    let mut chars = token[1..].chars();
    if let Some(first) = chars.next() {
        let remainder: String = chars.as_str().to_string();
        if !remainder.is_empty() {
            // One-letter prefix with an inline parameter, recorded under
            // `-x` but looked up under the decorated key `-x*` per the
            // example in §4.2.
            candidates.push(Candidate {
                name: format!("-{first}"),
                lookup_key: format!("-{first}*"),
                values: vec![remainder.clone()],
                next_tail: rest_tail.clone(),
                retry: false,
                category: Category::Short,
            });

            // One-letter cluster fallback: re-inject the remaining
            // letters as a new short-option token to reprocess.
            let mut reprocessed = vec![format!("-{remainder}")];
            reprocessed.extend(rest_tail);
            candidates.push(Candidate {
                name: format!("-{first}"),
                lookup_key: format!("-{first}"),
                values: Vec::new(),
                next_tail: reprocessed,
                retry: false,
                category: Category::Short,
            });
        }
    }

    candidates
}
