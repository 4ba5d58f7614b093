//! Spoken numeral normalization
//!
//! Turns speech-recognised digit sequences into digit strings:
//! "seven eight seven oh one" becomes "78701", "double five" becomes "55",
//! "seven eighty seven" becomes "787". Consecutive digit tokens are joined
//! into one run; other words pass through unchanged.
//!
//! "oh" and "o" read as zero only next to another digit token, so "oh, the
//! heater" is left alone.

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Digits(String),
    /// "oh" / "o"; zero only when adjacent to digits
    Oh,
    /// "double" / "triple"
    Repeat(usize),
    Word(String),
}

fn unit_value(word: &str) -> Option<char> {
    Some(match word {
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        _ => return None,
    })
}

fn teen_value(word: &str) -> Option<&'static str> {
    Some(match word {
        "ten" => "10",
        "eleven" => "11",
        "twelve" => "12",
        "thirteen" => "13",
        "fourteen" => "14",
        "fifteen" => "15",
        "sixteen" => "16",
        "seventeen" => "17",
        "eighteen" => "18",
        "nineteen" => "19",
        _ => return None,
    })
}

fn tens_value(word: &str) -> Option<char> {
    Some(match word {
        "twenty" => '2',
        "thirty" => '3',
        "forty" => '4',
        "fifty" => '5',
        "sixty" => '6',
        "seventy" => '7',
        "eighty" => '8',
        "ninety" => '9',
        _ => return None,
    })
}

fn tokenize(text: &str) -> Vec<Token> {
    let lowered = text.to_lowercase();
    let raw: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || c == '-' || c == ',' || c == '.')
        .filter(|t| !t.is_empty())
        .collect();

    let mut tokens = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let word = raw[i].trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');

        if word.is_empty() {
            i += 1;
            continue;
        }

        if word.chars().all(|c| c.is_ascii_digit()) {
            tokens.push(Token::Digits(word.to_string()));
        } else if let Some(d) = unit_value(word) {
            tokens.push(Token::Digits(d.to_string()));
        } else if let Some(teen) = teen_value(word) {
            tokens.push(Token::Digits(teen.to_string()));
        } else if let Some(tens) = tens_value(word) {
            // "eighty seven" → "87", bare "eighty" → "80"
            let next_unit = raw
                .get(i + 1)
                .and_then(|n| unit_value(n))
                .filter(|d| *d != '0');
            match next_unit {
                Some(unit) => {
                    tokens.push(Token::Digits(format!("{}{}", tens, unit)));
                    i += 1;
                }
                None => tokens.push(Token::Digits(format!("{}0", tens))),
            }
        } else if word == "oh" || word == "o" {
            tokens.push(Token::Oh);
        } else if word == "double" {
            tokens.push(Token::Repeat(2));
        } else if word == "triple" {
            tokens.push(Token::Repeat(3));
        } else {
            tokens.push(Token::Word(word.to_string()));
        }
        i += 1;
    }
    tokens
}

/// Resolve "oh" and repeat markers. An "oh" is zero when a neighbouring
/// token is a digit (or another "oh" that is itself next to a digit).
fn resolve(tokens: Vec<Token>) -> Vec<Token> {
    let len = tokens.len();
    let mut oh_is_zero = vec![false; len];

    for (idx, tok) in tokens.iter().enumerate() {
        if *tok != Token::Oh {
            continue;
        }
        let prev = idx.checked_sub(1).and_then(|p| tokens.get(p));
        let next = tokens.get(idx + 1);
        oh_is_zero[idx] = matches!(prev, Some(Token::Digits(_)) | Some(Token::Repeat(_)))
            || matches!(next, Some(Token::Digits(_)));
    }
    // Propagate through runs like "seven oh oh one"
    for _ in 0..len {
        let mut changed = false;
        for idx in 0..len {
            if tokens[idx] == Token::Oh && !oh_is_zero[idx] {
                let left = idx > 0 && tokens[idx - 1] == Token::Oh && oh_is_zero[idx - 1];
                let right = idx + 1 < len && tokens[idx + 1] == Token::Oh && oh_is_zero[idx + 1];
                if left || right {
                    oh_is_zero[idx] = true;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let mut out = Vec::with_capacity(len);
    let mut pending_repeat: Option<usize> = None;
    for (idx, tok) in tokens.into_iter().enumerate() {
        let tok = match tok {
            Token::Oh if oh_is_zero[idx] => Token::Digits("0".to_string()),
            Token::Oh => Token::Word("oh".to_string()),
            other => other,
        };
        match tok {
            Token::Repeat(n) => {
                if let Some(prev) = pending_repeat.take() {
                    out.push(Token::Word(repeat_word(prev).to_string()));
                }
                pending_repeat = Some(n);
            }
            Token::Digits(d) => {
                let d = match pending_repeat.take() {
                    Some(n) => {
                        // "double five" repeats the first digit
                        let mut chars = d.chars();
                        let first = chars.next().unwrap_or('0');
                        let rest: String = chars.collect();
                        format!("{}{}", first.to_string().repeat(n), rest)
                    }
                    None => d,
                };
                out.push(Token::Digits(d));
            }
            Token::Word(w) => {
                if let Some(prev) = pending_repeat.take() {
                    out.push(Token::Word(repeat_word(prev).to_string()));
                }
                out.push(Token::Word(w));
            }
            Token::Oh => {}
        }
    }
    if let Some(prev) = pending_repeat {
        out.push(Token::Word(repeat_word(prev).to_string()));
    }
    out
}

fn repeat_word(n: usize) -> &'static str {
    if n == 3 {
        "triple"
    } else {
        "double"
    }
}

/// Normalize spoken digits; adjacent digit tokens are joined into one run
pub fn normalize_spoken_digits(text: &str) -> String {
    let tokens = resolve(tokenize(text));
    let mut parts: Vec<String> = Vec::new();
    let mut run = String::new();

    for tok in tokens {
        match tok {
            Token::Digits(d) => run.push_str(&d),
            Token::Word(w) => {
                if !run.is_empty() {
                    parts.push(std::mem::take(&mut run));
                }
                parts.push(w);
            }
            Token::Oh | Token::Repeat(_) => {}
        }
    }
    if !run.is_empty() {
        parts.push(run);
    }
    parts.join(" ")
}

/// Digit runs found after normalization, in order
pub fn digit_runs(text: &str) -> Vec<String> {
    normalize_spoken_digits(text)
        .split(' ')
        .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Whether the text contains any digit-like token
pub fn has_digits(text: &str) -> bool {
    tokenize(text).iter().any(|t| matches!(t, Token::Digits(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spoken_zip() {
        assert_eq!(normalize_spoken_digits("seven eight seven oh one"), "78701");
        assert_eq!(normalize_spoken_digits("Seven, eight, seven, four, five."), "78745");
    }

    #[test]
    fn test_oh_needs_digit_context() {
        assert_eq!(normalize_spoken_digits("oh the heater died"), "oh the heater died");
        assert_eq!(normalize_spoken_digits("seven oh oh one two"), "70012");
    }

    #[test]
    fn test_double_and_tens() {
        assert_eq!(normalize_spoken_digits("double seven eight oh one"), "77801");
        assert_eq!(normalize_spoken_digits("seven eighty seven oh one"), "78701");
        assert_eq!(normalize_spoken_digits("seventy eight seven four five"), "78745");
    }

    #[test]
    fn test_mixed_digits_and_words() {
        assert_eq!(normalize_spoken_digits("it's 787 01 thanks"), "it's 78701 thanks");
        assert_eq!(digit_runs("unit 2 at 78745"), vec!["2", "78745"]);
    }

    #[test]
    fn test_hyphenated_digits_join() {
        assert_eq!(normalize_spoken_digits("512-555-0100"), "5125550100");
    }

    #[test]
    fn test_has_digits() {
        assert!(has_digits("one two"));
        assert!(!has_digits("oh no"));
    }
}
