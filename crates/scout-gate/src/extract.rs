use std::path::Path;

const CHAIN_OPERATORS: &[&str] = &["|", "||", "&&", "&"];
const SHELL_KEYWORDS: &[&str] = &["if", "then", "else", "fi", "for", "while", "do", "done"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Programs(Vec<String>),
    /// A segment had unbalanced quotes, a dangling escape or a command
    /// substitution.
    Unparseable,
}

/// Constructs that run a nested command the extractor cannot see into.
const SUBSTITUTIONS: &[&str] = &["$(", "`", "<(", ">("];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    Single,
    Double,
}

/// Splits on `;`, `\n` and `\r` outside quotes. Unquoted `|` and `&` are
/// padded with spaces so `ls|sudo x` tokenizes the same as `ls | sudo x`;
/// redirections such as `2>&1` are left intact. Segments are trimmed and
/// empty ones dropped. Quote balance is left to the tokenizer.
pub fn split_segments(command: &str) -> Vec<String> {
    let chars: Vec<char> = command.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<Quote> = None;
    let mut escaped = false;

    for (idx, &ch) in chars.iter().enumerate() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match quote {
            Some(Quote::Single) => {
                if ch == '\'' {
                    quote = None;
                }
                current.push(ch);
            }
            Some(Quote::Double) => {
                match ch {
                    '\\' => escaped = true,
                    '"' => quote = None,
                    _ => {}
                }
                current.push(ch);
            }
            None => match ch {
                '\\' => {
                    escaped = true;
                    current.push(ch);
                }
                '\'' => {
                    quote = Some(Quote::Single);
                    current.push(ch);
                }
                '"' => {
                    quote = Some(Quote::Double);
                    current.push(ch);
                }
                ';' | '\n' | '\r' => segments.push(std::mem::take(&mut current)),
                '|' | '&' if !is_redirection(&chars, idx) => {
                    current.push(' ');
                    current.push(ch);
                    current.push(' ');
                }
                _ => current.push(ch),
            },
        }
    }
    segments.push(current);
    segments
        .into_iter()
        .map(|segment| segment.trim().to_string())
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// `>&`, `<&`, `&>` and `>|` belong to a redirection, not a chain.
fn is_redirection(chars: &[char], idx: usize) -> bool {
    let prev = idx.checked_sub(1).map(|i| chars[i]);
    let next = chars.get(idx + 1).copied();
    matches!(prev, Some('>') | Some('<')) || (chars[idx] == '&' && next == Some('>'))
}

fn program_name(token: &str) -> String {
    Path::new(token)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(token)
        .to_string()
}

fn is_env_assignment(token: &str) -> bool {
    matches!(token.find('='), Some(pos) if pos > 0)
}

/// Collects the program names invoked anywhere in `command`, in order of
/// appearance. Pipelines, `&&`/`||` chains and background `&` each start a
/// new command position. Substitutions such as `$(..)` or backticks are
/// rejected even inside quotes.
pub fn extract_programs(command: &str) -> Extraction {
    let mut programs = Vec::new();
    for segment in split_segments(command) {
        if SUBSTITUTIONS.iter().any(|marker| segment.contains(marker)) {
            return Extraction::Unparseable;
        }
        let Some(tokens) = shlex::split(&segment) else {
            return Extraction::Unparseable;
        };

        let mut expect_command = true;
        for token in &tokens {
            if CHAIN_OPERATORS.contains(&token.as_str()) {
                expect_command = true;
                continue;
            }
            if SHELL_KEYWORDS.contains(&token.as_str()) {
                continue;
            }
            if token.starts_with('-') || is_env_assignment(token) {
                continue;
            }
            if expect_command {
                programs.push(program_name(token));
                expect_command = false;
            }
        }
    }
    Extraction::Programs(programs)
}
