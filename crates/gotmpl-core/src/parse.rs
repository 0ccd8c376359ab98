use std::collections::BTreeMap;

use crate::ast::{Branch, Command, Constant, Node, Number, Operand, OperandKind, Pipe, Tree};
use crate::error::ParseError;
use crate::format::go_quote;
use crate::funcs;
use crate::lex::{self, Item, ItemKind};

/// Control structures, blocks and parenthesized pipelines may nest this deep
/// in total.
pub const MAX_NESTING: usize = 100;

/// What ended an item list.
enum Terminator {
    End,
    Else,
}

impl std::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminator::End => f.write_str("{{end}}"),
            Terminator::Else => f.write_str("{{else}}"),
        }
    }
}

enum Parsed {
    Node(Node),
    End(Terminator),
}

type PResult<T> = Result<T, ParseError>;

struct Parser {
    name: String,
    items: Vec<Item>,
    idx: usize,
    high: usize,
    vars: Vec<String>,
    range_depth: usize,
    nesting: usize,
    action_line: usize,
    trees: BTreeMap<String, Tree>,
}

/// Parses `text` into the set of templates it defines. The top-level body is
/// stored under `name`; `define` and `block` add further entries.
pub fn parse(name: &str, text: &str) -> PResult<BTreeMap<String, Tree>> {
    let mut p = Parser {
        name: name.to_string(),
        items: lex::lex(text),
        idx: 0,
        high: 0,
        vars: vec!["$".to_string()],
        range_depth: 0,
        nesting: 0,
        action_line: 0,
        trees: BTreeMap::new(),
    };
    let root = p.parse_root()?;
    p.add(Tree {
        name: name.to_string(),
        root,
    })?;
    Ok(p.trees)
}

impl Parser {
    fn errorf(&self, message: impl std::fmt::Display) -> ParseError {
        let line = self.items.get(self.high).map_or(1, |item| item.line);
        ParseError {
            message: format!("template: {}:{}: {}", self.name, line, message),
            line,
        }
    }

    fn fetch(&mut self, idx: usize) -> Item {
        let last = self.items.len().saturating_sub(1);
        let idx = idx.min(last);
        self.high = self.high.max(idx);
        self.items[idx].clone()
    }

    fn next(&mut self) -> Item {
        let item = self.fetch(self.idx);
        self.idx += 1;
        item
    }

    fn backup(&mut self) {
        self.idx = self.idx.saturating_sub(1);
    }

    fn peek(&mut self) -> Item {
        self.fetch(self.idx)
    }

    fn next_non_space(&mut self) -> Item {
        loop {
            let item = self.next();
            if item.kind != ItemKind::Space {
                return item;
            }
        }
    }

    fn peek_non_space(&mut self) -> Item {
        let item = self.next_non_space();
        self.backup();
        item
    }

    fn expect(&mut self, kind: ItemKind, context: &str) -> PResult<Item> {
        let token = self.next_non_space();
        if token.kind != kind {
            return Err(self.unexpected(&token, context));
        }
        Ok(token)
    }

    fn unexpected(&self, token: &Item, context: &str) -> ParseError {
        if token.kind == ItemKind::Error {
            let mut extra = String::new();
            if self.action_line != 0 && self.action_line != token.line {
                extra = format!(" in action started at {}:{}", self.name, self.action_line);
                if token.val.ends_with(" action") {
                    extra = extra[" in action".len()..].to_string();
                }
            }
            return self.errorf(format!("{token}{extra}"));
        }
        self.errorf(format!("unexpected {token} in {context}"))
    }

    fn add(&mut self, tree: Tree) -> PResult<()> {
        match self.trees.get(&tree.name) {
            Some(existing) if !existing.is_empty() => {
                if !tree.is_empty() {
                    return Err(self.errorf(format!(
                        "template: multiple definition of template {}",
                        go_quote(&tree.name)
                    )));
                }
            }
            _ => {
                self.trees.insert(tree.name.clone(), tree);
            }
        }
        Ok(())
    }

    fn parse_root(&mut self) -> PResult<Vec<Node>> {
        let mut root = Vec::new();
        while self.peek().kind != ItemKind::Eof {
            if self.peek().kind == ItemKind::LeftDelim {
                let delim_idx = self.idx;
                self.next();
                if self.next_non_space().kind == ItemKind::Define {
                    self.parse_definition()?;
                    continue;
                }
                self.idx = delim_idx;
            }
            match self.text_or_action()? {
                Parsed::Node(node) => root.push(node),
                Parsed::End(end) => return Err(self.errorf(format!("unexpected {end}"))),
            }
        }
        Ok(root)
    }

    /// Runs `body` with fresh per-tree state, as `define` and `block`
    /// bodies do not see the enclosing variables.
    fn in_new_tree<T>(&mut self, body: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let range_depth = std::mem::take(&mut self.range_depth);
        let result = body(self);
        self.vars = vars;
        self.range_depth = range_depth;
        result
    }

    fn parse_definition(&mut self) -> PResult<()> {
        const CONTEXT: &str = "define clause";
        let token = self.next_non_space();
        if token.kind != ItemKind::String && token.kind != ItemKind::RawString {
            return Err(self.unexpected(&token, CONTEXT));
        }
        let name = lex::unquote(&token.val).ok_or_else(|| self.errorf("invalid syntax"))?;
        self.expect(ItemKind::RightDelim, CONTEXT)?;
        let root = self.in_new_tree(|p| {
            let (list, end) = p.item_list()?;
            if !matches!(end, Terminator::End) {
                return Err(p.errorf(format!("unexpected {end} in {CONTEXT}")));
            }
            Ok(list)
        })?;
        self.add(Tree { name, root })
    }

    fn item_list(&mut self) -> PResult<(Vec<Node>, Terminator)> {
        let mut list = Vec::new();
        while self.peek_non_space().kind != ItemKind::Eof {
            match self.text_or_action()? {
                Parsed::Node(node) => list.push(node),
                Parsed::End(end) => return Ok((list, end)),
            }
        }
        Err(self.errorf("unexpected EOF"))
    }

    fn text_or_action(&mut self) -> PResult<Parsed> {
        let token = self.next_non_space();
        match token.kind {
            ItemKind::Text => Ok(Parsed::Node(Node::Text {
                pos: token.pos,
                text: token.val,
            })),
            ItemKind::LeftDelim => {
                self.action_line = token.line;
                let result = self.action();
                self.action_line = 0;
                result
            }
            _ => Err(self.unexpected(&token, "input")),
        }
    }

    fn action(&mut self) -> PResult<Parsed> {
        let token = self.next_non_space();
        let node = match token.kind {
            ItemKind::Block => self.block_control()?,
            ItemKind::Break | ItemKind::Continue => self.loop_control(&token)?,
            ItemKind::Else => return self.else_control(),
            ItemKind::End => {
                self.expect(ItemKind::RightDelim, "end")?;
                return Ok(Parsed::End(Terminator::End));
            }
            ItemKind::If => Node::If(self.parse_control("if")?),
            ItemKind::Range => Node::Range(self.parse_control("range")?),
            ItemKind::Template => self.template_control()?,
            ItemKind::With => Node::With(self.parse_control("with")?),
            _ => {
                self.backup();
                let token = self.peek();
                // Variables declared here stay in scope until the enclosing {{end}}.
                let pipe = self.pipeline("command", ItemKind::RightDelim)?;
                Node::Action {
                    pos: token.pos,
                    line: token.line,
                    pipe,
                }
            }
        };
        Ok(Parsed::Node(node))
    }

    fn loop_control(&mut self, keyword: &Item) -> PResult<Node> {
        let token = self.next_non_space();
        let name = if keyword.kind == ItemKind::Break {
            "break"
        } else {
            "continue"
        };
        if token.kind != ItemKind::RightDelim {
            return Err(self.unexpected(&token, &format!("{{{{{name}}}}}")));
        }
        if self.range_depth == 0 {
            return Err(self.errorf(format!("{{{{{name}}}}} outside {{{{range}}}}")));
        }
        Ok(if keyword.kind == ItemKind::Break {
            Node::Break {
                pos: keyword.pos,
                line: keyword.line,
            }
        } else {
            Node::Continue {
                pos: keyword.pos,
                line: keyword.line,
            }
        })
    }

    fn else_control(&mut self) -> PResult<Parsed> {
        let peek = self.peek_non_space();
        // "{{else if" and "{{else with" leave the keyword pending for parse_control.
        if peek.kind == ItemKind::If || peek.kind == ItemKind::With {
            return Ok(Parsed::End(Terminator::Else));
        }
        self.expect(ItemKind::RightDelim, "else")?;
        Ok(Parsed::End(Terminator::Else))
    }

    /// Runs `body` one nesting level deeper, failing once `MAX_NESTING` is
    /// reached.
    fn nested<T>(&mut self, what: &str, body: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.nesting >= MAX_NESTING {
            return Err(self.errorf(format!("max {what} depth exceeded")));
        }
        self.nesting += 1;
        let result = body(self);
        self.nesting -= 1;
        result
    }

    fn parse_control(&mut self, context: &str) -> PResult<Branch> {
        self.nested("nesting", |p| {
            let mark = p.vars.len();
            let result = p.parse_control_body(context);
            p.vars.truncate(mark);
            result
        })
    }

    fn parse_control_body(&mut self, context: &str) -> PResult<Branch> {
        let pipe = self.pipeline(context, ItemKind::RightDelim)?;
        if context == "range" {
            self.range_depth += 1;
        }
        let listed = self.item_list();
        if context == "range" {
            self.range_depth -= 1;
        }
        let (list, next) = listed?;
        let else_list = match next {
            Terminator::End => None,
            Terminator::Else => {
                if context == "if" && self.peek().kind == ItemKind::If {
                    self.next();
                    Some(vec![Node::If(self.parse_control("if")?)])
                } else if context == "with" && self.peek().kind == ItemKind::With {
                    self.next();
                    Some(vec![Node::With(self.parse_control("with")?)])
                } else {
                    let (else_list, next) = self.item_list()?;
                    if !matches!(next, Terminator::End) {
                        return Err(self.errorf(format!("expected end; found {next}")));
                    }
                    Some(else_list)
                }
            }
        };
        Ok(Branch {
            pos: pipe.pos,
            line: pipe.line,
            pipe,
            list,
            else_list,
        })
    }

    fn block_control(&mut self) -> PResult<Node> {
        const CONTEXT: &str = "block clause";
        let token = self.next_non_space();
        let name = self.parse_template_name(&token, CONTEXT)?;
        let pipe = self.pipeline(CONTEXT, ItemKind::RightDelim)?;
        let root = self.nested("nesting", |p| {
            p.in_new_tree(|p| {
                let (list, end) = p.item_list()?;
                if !matches!(end, Terminator::End) {
                    return Err(p.errorf(format!("unexpected {end} in {CONTEXT}")));
                }
                Ok(list)
            })
        })?;
        self.add(Tree {
            name: name.clone(),
            root,
        })?;
        Ok(Node::Template {
            pos: token.pos,
            line: token.line,
            name,
            pipe: Some(pipe),
        })
    }

    fn template_control(&mut self) -> PResult<Node> {
        const CONTEXT: &str = "template clause";
        let token = self.next_non_space();
        let name = self.parse_template_name(&token, CONTEXT)?;
        let pipe = if self.next_non_space().kind != ItemKind::RightDelim {
            self.backup();
            Some(self.pipeline(CONTEXT, ItemKind::RightDelim)?)
        } else {
            None
        };
        Ok(Node::Template {
            pos: token.pos,
            line: token.line,
            name,
            pipe,
        })
    }

    fn parse_template_name(&mut self, token: &Item, context: &str) -> PResult<String> {
        match token.kind {
            ItemKind::String | ItemKind::RawString => {
                lex::unquote(&token.val).ok_or_else(|| self.errorf("invalid syntax"))
            }
            _ => Err(self.unexpected(token, context)),
        }
    }

    fn pipeline(&mut self, context: &str, end: ItemKind) -> PResult<Pipe> {
        let token = self.peek_non_space();
        let mut pipe = Pipe {
            pos: token.pos,
            line: token.line,
            is_assign: false,
            decl: Vec::new(),
            cmds: Vec::new(),
        };
        loop {
            let v = self.peek_non_space();
            if v.kind != ItemKind::Variable {
                break;
            }
            let v_idx = self.idx;
            self.next();
            let next = self.peek_non_space();
            match next.kind {
                ItemKind::Assign | ItemKind::Declare => {
                    pipe.is_assign = next.kind == ItemKind::Assign;
                    self.next_non_space();
                    pipe.decl.push(v.val.clone());
                    self.vars.push(v.val);
                    break;
                }
                ItemKind::Char if next.val == "," => {
                    self.next_non_space();
                    pipe.decl.push(v.val.clone());
                    self.vars.push(v.val);
                    if context == "range" && pipe.decl.len() < 2 {
                        match self.peek_non_space().kind {
                            ItemKind::Variable | ItemKind::RightDelim | ItemKind::RightParen => {
                                continue;
                            }
                            _ => return Err(self.errorf("range can only initialize variables")),
                        }
                    }
                    return Err(self.errorf(format!("too many declarations in {context}")));
                }
                _ => {
                    self.idx = v_idx;
                    break;
                }
            }
        }
        loop {
            let token = self.next_non_space();
            match token.kind {
                kind if kind == end => {
                    self.check_pipeline(&pipe, context)?;
                    return Ok(pipe);
                }
                ItemKind::Bool
                | ItemKind::CharConstant
                | ItemKind::Dot
                | ItemKind::Field
                | ItemKind::Identifier
                | ItemKind::Number
                | ItemKind::Nil
                | ItemKind::RawString
                | ItemKind::String
                | ItemKind::Variable
                | ItemKind::LeftParen => {
                    self.backup();
                    let cmd = self.command()?;
                    pipe.cmds.push(cmd);
                }
                _ => return Err(self.unexpected(&token, context)),
            }
        }
    }

    fn check_pipeline(&self, pipe: &Pipe, context: &str) -> PResult<()> {
        if pipe.cmds.is_empty() {
            return Err(self.errorf(format!("missing value for {context}")));
        }
        for (i, cmd) in pipe.cmds.iter().enumerate().skip(1) {
            if cmd.args[0].kind.is_literal() {
                return Err(self.errorf(format!(
                    "non executable command in pipeline stage {}",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    fn command(&mut self) -> PResult<Command> {
        let start = self.peek_non_space();
        let mut cmd = Command {
            pos: start.pos,
            args: Vec::new(),
        };
        loop {
            self.peek_non_space();
            if let Some(operand) = self.operand()? {
                cmd.args.push(operand);
            }
            let token = self.next();
            match token.kind {
                ItemKind::Space => continue,
                ItemKind::RightDelim | ItemKind::RightParen => self.backup(),
                ItemKind::Pipe => {}
                _ => return Err(self.unexpected(&token, "operand")),
            }
            break;
        }
        if cmd.args.is_empty() {
            return Err(self.errorf("empty command"));
        }
        Ok(cmd)
    }

    fn operand(&mut self) -> PResult<Option<Operand>> {
        let Some(node) = self.term()? else {
            return Ok(None);
        };
        if self.peek().kind != ItemKind::Field {
            return Ok(Some(node));
        }
        let chain_pos = self.peek().pos;
        let mut fields = Vec::new();
        while self.peek().kind == ItemKind::Field {
            let field = self.next();
            fields.push(field.val[1..].to_string());
        }
        let kind = match node.kind {
            OperandKind::Field(mut idents) => {
                idents.extend(fields);
                OperandKind::Field(idents)
            }
            OperandKind::Variable(mut idents) => {
                idents.extend(fields);
                OperandKind::Variable(idents)
            }
            ref kind if kind.is_literal() => {
                return Err(self.errorf(format!(
                    "unexpected . after term {}",
                    go_quote(&node.to_string())
                )));
            }
            _ => OperandKind::Chain(Box::new(node), fields),
        };
        Ok(Some(Operand {
            pos: chain_pos,
            kind,
        }))
    }

    fn term(&mut self) -> PResult<Option<Operand>> {
        let token = self.next_non_space();
        let kind = match token.kind {
            ItemKind::Identifier => {
                if !funcs::is_builtin(&token.val) {
                    return Err(self.errorf(format!(
                        "function {} not defined",
                        go_quote(&token.val)
                    )));
                }
                OperandKind::Identifier(token.val)
            }
            ItemKind::Dot => OperandKind::Dot,
            ItemKind::Nil => OperandKind::Nil,
            ItemKind::Variable => {
                let idents: Vec<String> = token.val.split('.').map(str::to_string).collect();
                if !self.vars.iter().any(|v| *v == idents[0]) {
                    return Err(self.errorf(format!(
                        "undefined variable {}",
                        go_quote(&idents[0])
                    )));
                }
                OperandKind::Variable(idents)
            }
            ItemKind::Field => OperandKind::Field(
                token.val[1..].split('.').map(str::to_string).collect(),
            ),
            ItemKind::Bool => OperandKind::Bool(token.val == "true"),
            ItemKind::CharConstant | ItemKind::Number => {
                let number = new_number(&token.val, token.kind).map_err(|msg| self.errorf(msg))?;
                OperandKind::Number(number)
            }
            ItemKind::LeftParen => {
                let pipe = self.nested("expression", |p| {
                    p.pipeline("parenthesized pipeline", ItemKind::RightParen)
                })?;
                OperandKind::Pipe(Box::new(pipe))
            }
            ItemKind::String | ItemKind::RawString => {
                let text = lex::unquote(&token.val).ok_or_else(|| self.errorf("invalid syntax"))?;
                OperandKind::String {
                    quoted: token.val,
                    text,
                }
            }
            _ => {
                self.backup();
                return Ok(None);
            }
        };
        Ok(Some(Operand {
            pos: token.pos,
            kind,
        }))
    }
}

fn underscore_ok(s: &str) -> bool {
    let s = s.strip_prefix(['+', '-']).unwrap_or(s);
    let bytes = s.as_bytes();
    let mut saw = b'^';
    let mut i = 0;
    let mut hex = false;
    if bytes.len() >= 2
        && bytes[0] == b'0'
        && matches!(bytes[1].to_ascii_lowercase(), b'b' | b'o' | b'x')
    {
        i = 2;
        saw = b'0';
        hex = bytes[1].to_ascii_lowercase() == b'x';
    }
    while i < bytes.len() {
        let c = bytes[i];
        i += 1;
        if c.is_ascii_digit() || (hex && c.is_ascii_hexdigit()) {
            saw = b'0';
            continue;
        }
        if c == b'_' {
            if saw != b'0' {
                return false;
            }
            saw = b'_';
            continue;
        }
        if saw == b'_' {
            return false;
        }
        saw = b'!';
    }
    saw != b'_'
}

/// Parses an unsigned integer literal with Go's base-prefix rules.
fn parse_uint(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    let (radix, digits) = match s.as_bytes() {
        [b'0', b'x' | b'X', ..] => (16, &s[2..]),
        [b'0', b'o' | b'O', ..] => (8, &s[2..]),
        [b'0', b'b' | b'B', ..] => (2, &s[2..]),
        [b'0', _, ..] => (8, &s[1..]),
        _ => (10, s),
    };
    if s.contains('_') && !underscore_ok(s) {
        return None;
    }
    let digits = digits.replace('_', "");
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    u64::from_str_radix(&digits, radix).ok()
}

fn parse_int(s: &str) -> Option<i64> {
    let (neg, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let u = parse_uint(body)?;
    if neg {
        if u <= i64::MAX as u64 + 1 {
            Some((u as i64).wrapping_neg())
        } else {
            None
        }
    } else {
        i64::try_from(u).ok()
    }
}

fn parse_float(s: &str) -> Option<f64> {
    let body = s.trim_start_matches(['+', '-']);
    if body.starts_with("0x") || body.starts_with("0X") {
        return None;
    }
    if s.contains('_') && !underscore_ok(s) {
        return None;
    }
    let cleaned = s.replace('_', "");
    if !cleaned
        .bytes()
        .all(|c| c.is_ascii_digit() || matches!(c, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn is_hex_int(s: &str) -> bool {
    s.len() > 2 && s.starts_with('0') && matches!(s.as_bytes()[1], b'x' | b'X') && !s.contains(['p', 'P'])
}

/// Classifies a numeric or character literal the way the template
/// language types untyped constants.
fn new_number(text: &str, kind: ItemKind) -> Result<Number, String> {
    if kind == ItemKind::CharConstant {
        let value = lex::unquote(text)
            .and_then(|s| s.chars().next())
            .ok_or_else(|| format!("malformed character constant: {text}"))?;
        return Ok(Number {
            text: text.to_string(),
            value: Constant::Int(i64::from(u32::from(value))),
        });
    }
    let as_uint = parse_uint(text);
    let mut as_int = parse_int(text);
    let mut as_float = None;
    if let Some(i) = as_int {
        as_float = Some(i as f64);
    } else if let Some(u) = as_uint {
        as_float = Some(u as f64);
    } else if let Some(f) = parse_float(text) {
        if !text.contains(['.', 'e', 'E', 'p', 'P']) {
            return Err(format!("integer overflow: {text}"));
        }
        as_float = Some(f);
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            as_int = Some(f as i64);
        }
    }
    let value = match (as_int, as_uint, as_float) {
        (_, _, Some(f)) if !is_hex_int(text) && text.contains(['.', 'e', 'E', 'p', 'P']) => {
            Constant::Float(f)
        }
        (Some(i), _, _) => Constant::Int(i),
        (None, Some(_), _) => Constant::Overflow,
        (None, None, Some(f)) => Constant::Float(f),
        (None, None, None) => return Err(format!("illegal number syntax: {}", go_quote(text))),
    };
    Ok(Number {
        text: text.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_err(src: &str) -> String {
        parse("t", src).expect_err("parse should fail").message
    }

    #[test]
    fn parses_fields_and_text() {
        let trees = parse("t", "Hello {{.Name}}").expect("parse");
        let tree = &trees["t"];
        assert_eq!(tree.root.len(), 2);
        assert_eq!(tree.root[1].to_string(), "{{.Name}}");
    }

    #[test]
    fn field_chains_fold_into_one_field() {
        let trees = parse("t", "{{.Missing.Field}}").expect("parse");
        let Node::Action { pipe, .. } = &trees["t"].root[0] else {
            panic!("expected action");
        };
        let operand = &pipe.cmds[0].args[0];
        assert_eq!(operand.to_string(), ".Missing.Field");
        assert_eq!(operand.pos, 10);
    }

    #[test]
    fn empty_if_is_missing_value() {
        assert_eq!(parse_err("{{if}}"), "template: t:1: missing value for if");
    }

    #[test]
    fn unterminated_if_reports_eof() {
        assert_eq!(parse_err("{{if .A}}x"), "template: t:1: unexpected EOF");
    }

    #[test]
    fn stray_end_is_rejected() {
        assert_eq!(parse_err("a{{end}}"), "template: t:1: unexpected {{end}}");
    }

    #[test]
    fn unknown_function_is_rejected() {
        assert_eq!(parse_err("{{nope 1}}"), r#"template: t:1: function "nope" not defined"#);
    }

    #[test]
    fn undefined_variable_is_rejected() {
        assert_eq!(parse_err("{{$x}}"), r#"template: t:1: undefined variable "$x""#);
    }

    #[test]
    fn variables_go_out_of_scope_at_end() {
        assert_eq!(
            parse_err("{{if true}}{{$x := 1}}{{end}}{{$x}}"),
            r#"template: t:1: undefined variable "$x""#
        );
    }

    #[test]
    fn break_outside_range() {
        assert_eq!(parse_err("{{break}}"), "template: t:1: {{break}} outside {{range}}");
    }

    #[test]
    fn unclosed_action_mentions_start_line() {
        assert_eq!(
            parse_err("line1\n{{.A\n\n"),
            "template: t:4: unclosed action started at t:2"
        );
    }

    #[test]
    fn literal_in_later_stage_is_not_executable() {
        assert_eq!(
            parse_err("{{.A | 1}}"),
            "template: t:1: non executable command in pipeline stage 2"
        );
    }

    #[test]
    fn defines_join_the_set() {
        let trees = parse("t", r#"{{define "x"}}X{{end}}{{template "x"}}"#).expect("parse");
        assert!(trees.contains_key("x"));
        assert!(trees.contains_key("t"));
    }

    #[test]
    fn duplicate_non_empty_define_is_rejected() {
        let err = parse_err(r#"{{define "x"}}a{{end}}{{define "x"}}b{{end}}"#);
        assert!(err.ends_with(r#"template: multiple definition of template "x""#), "{err}");
    }

    #[test]
    fn range_declarations() {
        parse("t", "{{range $i, $e := .}}{{$i}}{{$e}}{{end}}").expect("parse");
        assert_eq!(
            parse_err("{{range $i, 1}}{{end}}"),
            "template: t:1: range can only initialize variables"
        );
        assert_eq!(
            parse_err("{{with $a, $b := .}}{{end}}"),
            "template: t:1: too many declarations in with"
        );
    }

    #[test]
    fn number_literals() {
        assert_eq!(new_number("42", ItemKind::Number).expect("int").value, Constant::Int(42));
        assert_eq!(new_number("0x1F", ItemKind::Number).expect("hex").value, Constant::Int(31));
        assert_eq!(new_number("1_000", ItemKind::Number).expect("sep").value, Constant::Int(1000));
        assert_eq!(new_number("1.5", ItemKind::Number).expect("float").value, Constant::Float(1.5));
        assert_eq!(new_number("1e3", ItemKind::Number).expect("exp").value, Constant::Float(1000.0));
        assert_eq!(new_number("'a'", ItemKind::CharConstant).expect("char").value, Constant::Int(97));
        assert_eq!(
            new_number("18446744073709551615", ItemKind::Number).expect("uint").value,
            Constant::Overflow
        );
    }

    #[test]
    fn deep_parens_are_bounded() {
        let src = format!("{{{{{}1{}}}}}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert_eq!(parse_err(&src), "template: t:1: max expression depth exceeded");
    }

    #[test]
    fn deep_control_nesting_is_bounded() {
        let nested = |n: usize| format!("{}x{}", "{{if 1}}".repeat(n), "{{end}}".repeat(n));
        parse("t", &nested(MAX_NESTING)).expect("at the cap");
        assert_eq!(
            parse_err(&nested(MAX_NESTING + 1)),
            "template: t:1: max nesting depth exceeded"
        );
    }

    #[test]
    fn nested_blocks_count_toward_nesting() {
        let opens: String = (0..=MAX_NESTING)
            .map(|i| format!("{{{{block \"b{i}\" .}}}}"))
            .collect();
        let src = format!("{opens}x{}", "{{end}}".repeat(MAX_NESTING + 1));
        assert_eq!(parse_err(&src), "template: t:1: max nesting depth exceeded");
    }
}
