//! Dot-style Template Actions
//!
//! Translates `{{ ... }}` actions written in dot style into Tera syntax so
//! both notations render through the same engine.
//!
//! # Supported forms
//!
//! - references: `.name`, `.a.b`, `$var`, `$.name`; a bare `.` is the
//!   current `range` element, or the whole namespace outside any range
//! - calls: `index`, `eq`, `ne`, `lt`, `le`, `gt`, `ge`, `and`, `or`,
//!   `not`, `len` and every registered filter taking one value
//! - pipelines into filters: `.path | shell_escape`
//! - blocks: `if`, `else if`, `else`, `range`, `end`
//! - declarations: `$name := .value`
//! - trim markers (`{{- ... -}}`) and `{{/* comments */}}`
//!
//! An action outside these forms is not translated.

use std::collections::HashSet;

/// Context key holding the whole namespace, the target of a bare `.`.
pub(crate) const ROOT: &str = "__root";

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Num(String),
    Word(String),
    Pipe,
    Open,
    Close,
    Comma,
    Declare,
}

enum Term<'a> {
    Token(&'a Token),
    Group(&'a [Token]),
}

enum Block {
    If,
    Range { dot: String },
}

/// Stateful over one template: block actions are matched across tags.
pub(crate) struct Translator<'a> {
    filters: &'a HashSet<&'a str>,
    blocks: Vec<Block>,
}

impl<'a> Translator<'a> {
    pub(crate) fn new(filters: &'a HashSet<&'a str>) -> Self {
        Self {
            filters,
            blocks: Vec::new(),
        }
    }

    /// Translates one `{{ ... }}` tag, or returns `None` when the action is
    /// not in a supported form.
    pub(crate) fn translate(&mut self, tag: &str) -> Option<String> {
        let inner = tag.strip_prefix("{{")?.strip_suffix("}}")?;
        let (trim_left, inner) = strip_leading_marker(inner);
        let (trim_right, inner) = strip_trailing_marker(inner);
        let body = inner.trim();

        if let Some(comment) = body.strip_prefix("/*").and_then(|b| b.strip_suffix("*/")) {
            return Some(format!("{{#{}#}}", comment));
        }

        let tokens = tokenize(body)?;
        let statement = match tokens.as_slice() {
            [Token::Word(w), rest @ ..] if w == "if" => {
                let condition = self.pipeline(rest)?;
                self.blocks.push(Block::If);
                format!("if {}", condition)
            }
            [Token::Word(w)] if w == "else" => "else".to_string(),
            [Token::Word(w), Token::Word(i), rest @ ..] if w == "else" && i == "if" => {
                if !matches!(self.blocks.last(), Some(Block::If)) {
                    return None;
                }
                format!("elif {}", self.pipeline(rest)?)
            }
            [Token::Word(w)] if w == "end" => match self.blocks.pop()? {
                Block::If => "endif".to_string(),
                Block::Range { .. } => "endfor".to_string(),
            },
            [Token::Word(w), rest @ ..] if w == "range" => self.range(rest)?,
            [Token::Word(w), Token::Declare, rest @ ..] => {
                format!("set {} = {}", variable_name(w)?, self.pipeline(rest)?)
            }
            [Token::Word(w), ..]
                if matches!(
                    w.as_str(),
                    "else" | "end" | "with" | "define" | "template" | "block" | "break" | "continue"
                ) =>
            {
                return None;
            }
            _ => {
                let expression = self.pipeline(&tokens)?;
                return Some(format!(
                    "{} {} {}",
                    if trim_left { "{{-" } else { "{{" },
                    expression,
                    if trim_right { "-}}" } else { "}}" }
                ));
            }
        };

        Some(format!(
            "{} {} {}",
            if trim_left { "{%-" } else { "{%" },
            statement,
            if trim_right { "-%}" } else { "%}" }
        ))
    }

    fn range(&mut self, tokens: &[Token]) -> Option<String> {
        let (names, source) = match tokens {
            [Token::Word(value), Token::Declare, rest @ ..] => (vec![variable_name(value)?], rest),
            [Token::Word(key), Token::Comma, Token::Word(value), Token::Declare, rest @ ..] => {
                (vec![variable_name(key)?, variable_name(value)?], rest)
            }
            rest => (vec![format!("__it{}", self.range_depth() + 1)], rest),
        };

        let source = self.pipeline(source)?;
        let dot = names.last()?.clone();
        self.blocks.push(Block::Range { dot });
        Some(format!("for {} in {}", names.join(", "), source))
    }

    fn range_depth(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Block::Range { .. }))
            .count()
    }

    fn dot(&self) -> Option<&str> {
        self.blocks.iter().rev().find_map(|b| match b {
            Block::Range { dot } => Some(dot.as_str()),
            Block::If => None,
        })
    }

    fn pipeline(&self, tokens: &[Token]) -> Option<String> {
        let mut stages = split_pipeline(tokens).into_iter();
        let mut expression = self.command(stages.next()?, None)?;
        for stage in stages {
            expression = self.command(stage, Some(expression))?;
        }
        Some(expression)
    }

    /// One pipeline stage; `piped` is the previous stage, passed as the
    /// last argument.
    fn command(&self, tokens: &[Token], piped: Option<String>) -> Option<String> {
        let terms = terms(tokens)?;
        let (first, rest) = terms.split_first()?;

        if let Term::Token(Token::Word(name)) = first {
            if is_function_name(name) && (!rest.is_empty() || piped.is_some()) {
                return self.call(name, rest, piped);
            }
        }

        if !rest.is_empty() || piped.is_some() {
            return None;
        }
        self.term(first)
    }

    fn call(&self, name: &str, rest: &[Term<'_>], piped: Option<String>) -> Option<String> {
        if name == "index" {
            return if piped.is_none() { self.index(rest) } else { None };
        }

        let mut args = rest
            .iter()
            .map(|t| self.term(t))
            .collect::<Option<Vec<_>>>()?;
        args.extend(piped);

        let operator = match name {
            "eq" => "==",
            "ne" => "!=",
            "lt" => "<",
            "le" => "<=",
            "gt" => ">",
            "ge" => ">=",
            _ => "",
        };

        match (name, args.as_slice()) {
            (_, [a, b]) if !operator.is_empty() => Some(format!("{} {} {}", a, operator, b)),
            ("and" | "or", [_, _, ..]) => Some(args.join(&format!(" {} ", name))),
            ("not", [a]) => Some(format!("not {}", a)),
            ("len", [a]) => Some(format!("{} | length", a)),
            (filter, [a]) if self.filters.contains(filter) => Some(format!("{} | {}", a, filter)),
            _ => None,
        }
    }

    /// `index base k1 k2 ...` as a subscript chain.
    fn index(&self, args: &[Term<'_>]) -> Option<String> {
        let (base, keys) = args.split_first()?;
        if keys.is_empty() {
            return None;
        }
        let mut expression = match base {
            Term::Token(Token::Word(word)) => self.word(word)?,
            _ => return None,
        };

        for key in keys {
            expression = match key {
                Term::Token(Token::Str(key)) if expression == ROOT && is_identifier(key) => key.clone(),
                Term::Token(Token::Str(key)) => format!("{}[{}]", expression, literal(key)?),
                Term::Token(Token::Num(n))
                    if expression != ROOT && n.chars().all(|c| c.is_ascii_digit()) =>
                {
                    format!("{}.{}", expression, n)
                }
                Term::Token(Token::Word(word)) => {
                    let key = self.word(word)?;
                    if key == ROOT {
                        return None;
                    }
                    format!("{}[{}]", expression, key)
                }
                _ => return None,
            };
        }
        Some(expression)
    }

    fn term(&self, term: &Term<'_>) -> Option<String> {
        match term {
            Term::Group(tokens) => {
                let inner = self.pipeline(tokens)?;
                // Filters bind tighter than comparisons and logic in Tera
                if inner.contains(" | ") {
                    Some(inner)
                } else {
                    Some(format!("({})", inner))
                }
            }
            Term::Token(Token::Str(s)) => literal(s),
            Term::Token(Token::Num(n)) => Some(n.clone()),
            Term::Token(Token::Word(w)) => self.word(w),
            Term::Token(_) => None,
        }
    }

    fn word(&self, word: &str) -> Option<String> {
        if word == "." {
            return Some(self.dot().unwrap_or(ROOT).to_string());
        }
        if word == "$" {
            return Some(ROOT.to_string());
        }

        let path = if let Some(path) = word.strip_prefix("$.") {
            return is_path(path).then(|| path.to_string());
        } else if let Some(path) = word.strip_prefix('$') {
            path
        } else if let Some(path) = word.strip_prefix('.') {
            if !is_path(path) {
                return None;
            }
            return Some(match self.dot() {
                Some(dot) => format!("{}.{}", dot, path),
                None => path.to_string(),
            });
        } else if word == "nil" {
            return None;
        } else {
            word
        };

        is_path(path).then(|| path.to_string())
    }
}

fn strip_leading_marker(inner: &str) -> (bool, &str) {
    match inner.strip_prefix('-') {
        Some(rest) if rest.starts_with(char::is_whitespace) => (true, rest),
        _ => (false, inner),
    }
}

fn strip_trailing_marker(inner: &str) -> (bool, &str) {
    match inner.strip_suffix('-') {
        Some(rest) if rest.ends_with(char::is_whitespace) => (true, rest),
        _ => (false, inner),
    }
}

fn tokenize(body: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' | '(' | ')' | ',' => {
                chars.next();
                tokens.push(match c {
                    '|' => Token::Pipe,
                    '(' => Token::Open,
                    ')' => Token::Close,
                    _ => Token::Comma,
                });
            }
            ':' => {
                chars.next();
                if chars.next()?.1 != '=' {
                    return None;
                }
                tokens.push(Token::Declare);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next()?.1 {
                        '"' => break,
                        '\\' => value.push(match chars.next()?.1 {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        }),
                        other => value.push(other),
                    }
                }
                tokens.push(Token::Str(value));
            }
            '`' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next()?.1 {
                        '`' => break,
                        other => value.push(other),
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit()
                || (c == '-' && body[start + 1..].starts_with(|d: char| d.is_ascii_digit())) =>
            {
                chars.next();
                let mut end = start + 1;
                while let Some(&(i, d)) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    end = i + 1;
                    chars.next();
                }
                tokens.push(Token::Num(body[start..end].to_string()));
            }
            c if is_word_char(c) => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if !is_word_char(d) {
                        break;
                    }
                    end = i + 1;
                    chars.next();
                }
                tokens.push(Token::Word(body[start..end].to_string()));
            }
            _ => return None,
        }
    }

    Some(tokens)
}

/// Groups parenthesised runs into single terms.
fn terms(tokens: &[Token]) -> Option<Vec<Term<'_>>> {
    let mut terms = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Open => {
                let mut depth = 0usize;
                let mut j = i;
                loop {
                    match tokens.get(j)? {
                        Token::Open => depth += 1,
                        Token::Close => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                terms.push(Term::Group(&tokens[i + 1..j]));
                i = j + 1;
            }
            Token::Close | Token::Pipe | Token::Comma | Token::Declare => return None,
            token => {
                terms.push(Term::Token(token));
                i += 1;
            }
        }
    }

    Some(terms)
}

fn split_pipeline(tokens: &[Token]) -> Vec<&[Token]> {
    let mut stages = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Open => depth += 1,
            Token::Close => depth = depth.saturating_sub(1),
            Token::Pipe if depth == 0 => {
                stages.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    stages.push(&tokens[start..]);
    stages
}

/// A Tera string literal for `value`, using the first quote it lacks.
fn literal(value: &str) -> Option<String> {
    ['"', '\'', '`']
        .into_iter()
        .find(|q| !value.contains(*q))
        .map(|q| format!("{}{}{}", q, value, q))
}

fn variable_name(word: &str) -> Option<String> {
    word.strip_prefix('$')
        .filter(|name| is_identifier(name))
        .map(str::to_string)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$')
}

fn is_function_name(word: &str) -> bool {
    is_identifier(word) && !matches!(word, "true" | "false" | "nil")
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_path(path: &str) -> bool {
    let mut segments = path.split('.');
    segments.next().is_some_and(is_identifier)
        && segments.all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate_all(tags: &[&str]) -> Vec<Option<String>> {
        let filters: HashSet<&str> = ["shell_escape"].into_iter().collect();
        let mut translator = Translator::new(&filters);
        tags.iter().map(|tag| translator.translate(tag)).collect()
    }

    fn one(tag: &str) -> Option<String> {
        translate_all(&[tag]).remove(0)
    }

    #[test]
    fn test_references() {
        assert_eq!(one("{{ .name }}").as_deref(), Some("{{ name }}"));
        assert_eq!(one("{{.a.b}}").as_deref(), Some("{{ a.b }}"));
        assert_eq!(one("{{ $.name }}").as_deref(), Some("{{ name }}"));
        assert_eq!(one("{{ . }}").as_deref(), Some("{{ __root }}"));
        assert_eq!(one("{{ .a..b }}"), None);
    }

    #[test]
    fn test_index() {
        assert_eq!(one(r#"{{ index . "user" }}"#).as_deref(), Some("{{ user }}"));
        assert_eq!(
            one(r#"{{ index . "__step:s1:skipped" }}"#).as_deref(),
            Some(r#"{{ __root["__step:s1:skipped"] }}"#)
        );
        assert_eq!(
            one(r#"{{ index .hosts 0 "name" }}"#).as_deref(),
            Some(r#"{{ hosts.0["name"] }}"#)
        );
        assert_eq!(one(r#"{{ index .m $k }}"#).as_deref(), Some("{{ m[k] }}"));
        assert_eq!(one("{{ index .m }}"), None);
    }

    #[test]
    fn test_calls_and_pipelines() {
        assert_eq!(one("{{ shell_escape .p }}").as_deref(), Some("{{ p | shell_escape }}"));
        assert_eq!(one("{{ .p | shell_escape }}").as_deref(), Some("{{ p | shell_escape }}"));
        assert_eq!(one("{{ len .items }}").as_deref(), Some("{{ items | length }}"));
        assert_eq!(
            one(r#"{{ and (eq .env "prod") (not .dry) }}"#).as_deref(),
            Some(r#"{{ (env == "prod") and (not dry) }}"#)
        );
        assert_eq!(one("{{ gt (len .items) 2 }}").as_deref(), Some("{{ items | length > 2 }}"));
        assert_eq!(one("{{ unknown .x }}"), None);
        assert_eq!(one("{{ 1.5 + .n }}"), None);
    }

    #[test]
    fn test_blocks() {
        let out = translate_all(&[
            "{{ if .a }}",
            "{{ else if eq .b 2 }}",
            "{{- else -}}",
            "{{ end }}",
        ]);
        assert_eq!(
            out,
            vec![
                Some("{% if a %}".to_string()),
                Some("{% elif b == 2 %}".to_string()),
                Some("{%- else -%}".to_string()),
                Some("{% endif %}".to_string()),
            ]
        );
    }

    #[test]
    fn test_range_scopes_dot() {
        let out = translate_all(&[
            "{{ range .servers }}",
            "{{ .name }}",
            "{{ $.domain }}",
            "{{ end }}",
            "{{ .name }}",
        ]);
        assert_eq!(
            out,
            vec![
                Some("{% for __it1 in servers %}".to_string()),
                Some("{{ __it1.name }}".to_string()),
                Some("{{ domain }}".to_string()),
                Some("{% endfor %}".to_string()),
                Some("{{ name }}".to_string()),
            ]
        );
    }

    #[test]
    fn test_range_with_variables_and_declare() {
        assert_eq!(
            one("{{ range $k, $v := .ports }}").as_deref(),
            Some("{% for k, v in ports %}")
        );
        assert_eq!(one("{{ $n := len .items }}").as_deref(), Some("{% set n = items | length %}"));
    }

    #[test]
    fn test_unbalanced_end_and_comment() {
        assert_eq!(one("{{ end }}"), None);
        assert_eq!(one("{{/* note */}}").as_deref(), Some("{# note #}"));
    }
}
