//! POSIX shell-quote tokenizer for `run-z` command lines (§4.1).
//!
//! This is a hand-rolled scanner rather than a combinator grammar: quoting
//! and escaping are inherently stateful character-at-a-time decisions,
//! better expressed as a manual character loop than composed `nom`
//! parsers.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tokenized {
    pub tokens: Vec<String>,
    /// Saw a `${...}` environment-variable expansion.
    pub saw_env_expansion: bool,
    /// Saw a redirect, pipe, or comment outside quotes.
    pub saw_shell_construct: bool,
}

pub fn tokenize(line: &str) -> Tokenized {
    let mut tokens = Vec::new();
    let mut saw_env_expansion = false;
    let mut saw_shell_construct = false;
    let mut current = String::new();
    let mut in_token = false;

    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    current.push(c);
                }
            }
            '"' => {
                in_token = true;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => {
                            if let Some(&next) = chars.peek() {
                                if matches!(next, '"' | '\\' | '$' | '`') {
                                    current.push(chars.next().unwrap());
                                } else {
                                    current.push('\\');
                                }
                            }
                        }
                        '$' if chars.peek() == Some(&'{') => {
                            saw_env_expansion = true;
                            current.push('$');
                            current.push(chars.next().unwrap());
                        }
                        c => current.push(c),
                    }
                }
            }
            '\\' => {
                in_token = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '$' if chars.peek() == Some(&'{') => {
                in_token = true;
                saw_env_expansion = true;
                current.push('$');
                current.push(chars.next().unwrap());
            }
            '|' | '>' | '<' | ';' => {
                saw_shell_construct = true;
                in_token = true;
                current.push(c);
            }
            '#' => {
                saw_shell_construct = true;
                break;
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }

    Tokenized {
        tokens,
        saw_env_expansion,
        saw_shell_construct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        let t = tokenize("run-z dep1 dep2/-a");
        assert_eq!(t.tokens, vec!["run-z", "dep1", "dep2/-a"]);
        assert!(!t.saw_env_expansion);
        assert!(!t.saw_shell_construct);
    }

    #[test]
    fn handles_single_and_double_quotes() {
        let t = tokenize(r#"run-z task attr='a value' other="b value""#);
        assert_eq!(t.tokens, vec!["run-z", "task", "attr=a value", "other=b value"]);
    }

    #[test]
    fn handles_backslash_escapes() {
        let t = tokenize(r"run-z task attr=a\ value");
        assert_eq!(t.tokens, vec!["run-z", "task", "attr=a value"]);
    }

    #[test]
    fn detects_env_expansion() {
        let t = tokenize("run-z task attr=${HOME}");
        assert!(t.saw_env_expansion);
    }

    #[test]
    fn detects_shell_constructs() {
        let t = tokenize("run-z task | grep foo");
        assert!(t.saw_shell_construct);
    }
}
