//! Constant literals as they appear in Jinja config calls
//!
//! Covers strings, numbers, booleans, `None`, lists, tuples and dicts.
//! Anything else (calls, variables, operators) does not parse.

/// A parsed constant
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

impl Literal {
    /// Parse a whole source string, `None` if any of it is not a constant
    pub fn parse(source: &str) -> Option<Literal> {
        let mut parser = Parser {
            chars: source.chars().collect(),
            pos: 0,
        };
        let value = parser.value()?;
        parser.skip_ws();
        (parser.pos == parser.chars.len()).then_some(value)
    }

    /// Literal notation, with strings single-quoted unless they contain one
    pub fn repr(&self) -> String {
        match self {
            Literal::Str(s) => repr_str(s),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => format!("{:?}", f),
            Literal::Bool(true) => "True".to_string(),
            Literal::Bool(false) => "False".to_string(),
            Literal::None => "None".to_string(),
            Literal::List(items) => format!("[{}]", join(items)),
            Literal::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Literal::Tuple(items) => format!("({})", join(items)),
            Literal::Dict(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
        }
    }
}

fn join(items: &[Literal]) -> String {
    items.iter().map(Literal::repr).collect::<Vec<_>>().join(", ")
}

fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Option<Literal> {
        self.skip_ws();
        match self.peek()? {
            '\'' | '"' => {
                let mut s = self.string()?;
                // adjacent literals concatenate
                loop {
                    self.skip_ws();
                    match self.peek() {
                        Some('\'') | Some('"') => s.push_str(&self.string()?),
                        _ => break,
                    }
                }
                Some(Literal::Str(s))
            }
            '[' => {
                self.pos += 1;
                Some(Literal::List(self.items(']')?))
            }
            '(' => {
                self.pos += 1;
                let start = self.pos;
                let items = self.items(')')?;
                // `(x)` is grouping, `(x,)` is a tuple
                let trailing_comma = self.chars[start..self.pos - 1]
                    .iter()
                    .rev()
                    .find(|c| !c.is_whitespace())
                    == Some(&',');
                if items.len() == 1 && !trailing_comma {
                    items.into_iter().next()
                } else {
                    Some(Literal::Tuple(items))
                }
            }
            '{' => {
                self.pos += 1;
                self.dict()
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            c if c.is_alphabetic() => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    self.pos += 1;
                }
                let word: String = self.chars[start..self.pos].iter().collect();
                match word.as_str() {
                    "True" => Some(Literal::Bool(true)),
                    "False" => Some(Literal::Bool(false)),
                    "None" => Some(Literal::None),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.peek()?;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let c = self.peek()?;
            self.pos += 1;
            match c {
                '\\' => {
                    let escaped = self.peek()?;
                    self.pos += 1;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Option<Literal> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    if matches!(self.chars.get(self.pos + 1), Some('-') | Some('+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        if is_float {
            text.parse().ok().map(Literal::Float)
        } else {
            text.parse().ok().map(Literal::Int)
        }
    }

    /// Comma-separated values up to `close`, trailing comma allowed
    fn items(&mut self, close: char) -> Option<Vec<Literal>> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Some(items);
            }
            items.push(self.value()?);
            if !self.eat(',') {
                return self.eat(close).then_some(items);
            }
        }
    }

    fn dict(&mut self) -> Option<Literal> {
        let mut entries = Vec::new();
        loop {
            if self.eat('}') {
                return Some(Literal::Dict(entries));
            }
            let key = self.value()?;
            if !self.eat(':') {
                return None;
            }
            let value = self.value()?;
            entries.push((key, value));
            if !self.eat(',') {
                return self.eat('}').then(|| Literal::Dict(entries));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalars() {
        assert_eq!(Literal::parse("'a'"), Some(Literal::Str("a".to_string())));
        assert_eq!(Literal::parse(" -3 "), Some(Literal::Int(-3)));
        assert_eq!(Literal::parse("1.5"), Some(Literal::Float(1.5)));
        assert_eq!(Literal::parse("True"), Some(Literal::Bool(true)));
        assert_eq!(Literal::parse("None"), Some(Literal::None));
        assert_eq!(Literal::parse("'a' 'b'"), Some(Literal::Str("ab".to_string())));
    }

    #[test]
    fn non_constants_do_not_parse() {
        assert_eq!(Literal::parse("var('x')"), None);
        assert_eq!(Literal::parse("true"), None);
        assert_eq!(Literal::parse("1 + 1"), None);
        assert_eq!(Literal::parse("{'a': 1"), None);
    }

    #[test]
    fn containers() {
        let parsed = Literal::parse("{'k': [1, 'two', (3,)], \"d\": {'x': None},}").unwrap();
        assert_eq!(parsed.repr(), "{'k': [1, 'two', (3,)], 'd': {'x': None}}");
        assert_eq!(Literal::parse("(1)"), Some(Literal::Int(1)));
        assert_eq!(Literal::parse("(1, 2)").unwrap().repr(), "(1, 2)");
    }

    #[test]
    fn string_repr_quoting() {
        assert_eq!(Literal::Str("it's".to_string()).repr(), "\"it's\"");
        assert_eq!(Literal::Str("a'b\"c".to_string()).repr(), "'a\\'b\"c'");
        assert_eq!(Literal::Str("x\ny".to_string()).repr(), "'x\\ny'");
    }
}
