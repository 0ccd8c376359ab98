use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::ast::{Branch, Command, Constant, Node, Number, Operand, OperandKind, Pipe, Tree};
use crate::error::ExecError;
use crate::format::{display, go_quote};
use crate::funcs::{self, Builtin, Param};
use crate::value::Value;

pub const DEFAULT_MAX_DEPTH: usize = 100;

/// What a field lookup yields when the map has no such key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingKey {
    /// Same as `Invalid`: the lookup yields no value.
    #[default]
    Default,
    Invalid,
    Zero,
    Error,
}

impl FromStr for MissingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(MissingKey::Default),
            "invalid" => Ok(MissingKey::Invalid),
            "zero" => Ok(MissingKey::Zero),
            "error" => Ok(MissingKey::Error),
            _ => Err(format!("unrecognized option \"missingkey={s}\"")),
        }
    }
}

/// Limits and policies applied to one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    pub missing_key: MissingKey,
    /// Maximum combined nesting of `{{template}}` invocations, control
    /// structures and parenthesized pipelines.
    pub max_depth: usize,
    /// Evaluation step budget; 0 disables it.
    pub max_steps: u64,
    /// Output size cap in bytes; 0 disables it.
    pub max_output_bytes: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            missing_key: MissingKey::Default,
            max_depth: DEFAULT_MAX_DEPTH,
            max_steps: 0,
            max_output_bytes: 0,
        }
    }
}

/// The node a diagnostic points at.
#[derive(Clone, Copy)]
enum At<'a> {
    Node(&'a Node),
    Pipe(&'a Pipe),
    Command(&'a Command),
    Operand(&'a Operand),
}

impl At<'_> {
    fn pos(&self) -> usize {
        match self {
            At::Node(node) => node.pos(),
            At::Pipe(pipe) => pipe.pos,
            At::Command(cmd) => cmd.pos,
            At::Operand(op) => op.pos,
        }
    }
}

impl fmt::Display for At<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            At::Node(node) => write!(f, "{node}"),
            At::Pipe(pipe) => write!(f, "{pipe}"),
            At::Command(cmd) => write!(f, "{cmd}"),
            At::Operand(op) => write!(f, "{op}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

type EResult<T> = Result<T, ExecError>;

/// Walks the trees of one parse against one data document.
pub(crate) struct State<'a> {
    root_name: &'a str,
    text: &'a str,
    trees: &'a BTreeMap<String, Tree>,
    tmpl_name: &'a str,
    opts: &'a ExecOptions,
    vars: Vec<(&'a str, Value<'a>)>,
    depth: usize,
    steps: u64,
    out: String,
}

impl<'a> State<'a> {
    pub(crate) fn new(
        root_name: &'a str,
        text: &'a str,
        trees: &'a BTreeMap<String, Tree>,
        opts: &'a ExecOptions,
    ) -> Self {
        Self {
            root_name,
            text,
            trees,
            tmpl_name: root_name,
            opts,
            vars: Vec::new(),
            depth: 0,
            steps: 0,
            out: String::new(),
        }
    }

    pub(crate) fn run(mut self, tree: &'a Tree, dot: Value<'a>) -> EResult<String> {
        self.tmpl_name = &tree.name;
        self.vars.push(("$", dot.clone()));
        self.walk_list(&dot, &tree.root)?;
        Ok(self.out)
    }

    fn error_at(&self, at: At<'_>, message: impl fmt::Display) -> ExecError {
        let pos = at.pos().min(self.text.len());
        let before = self.text.get(..pos).unwrap_or(self.text);
        let line = 1 + before.matches('\n').count();
        let col = match before.rfind('\n') {
            Some(nl) => pos - (nl + 1),
            None => pos,
        };
        let mut context = at.to_string();
        if context.chars().count() > 20 {
            context = format!("{}...", context.chars().take(20).collect::<String>());
        }
        ExecError {
            message: format!(
                "template: {}:{}:{}: executing {} at <{}>: {}",
                self.root_name,
                line,
                col,
                go_quote(self.tmpl_name),
                context,
                message
            ),
        }
    }

    fn step(&mut self, at: At<'_>) -> EResult<()> {
        self.steps += 1;
        let max = self.opts.max_steps;
        if max > 0 && self.steps > max {
            return Err(self.error_at(at, format!("step budget exhausted (max_steps={max})")));
        }
        Ok(())
    }

    fn write(&mut self, at: At<'_>, text: &str) -> EResult<()> {
        let max = self.opts.max_output_bytes;
        if max > 0 && self.out.len() + text.len() > max {
            return Err(self.error_at(
                at,
                format!("output limit exceeded (max_output_bytes={max})"),
            ));
        }
        self.out.push_str(text);
        Ok(())
    }

    /// Runs `body` one level deeper. Every recursive walk or evaluation
    /// passes through here, so `max_depth` bounds the native stack.
    fn nested<T>(&mut self, at: At<'_>, body: impl FnOnce(&mut Self) -> EResult<T>) -> EResult<T> {
        if self.depth >= self.opts.max_depth {
            return Err(self.error_at(
                at,
                format!("exceeded maximum template depth ({})", self.opts.max_depth),
            ));
        }
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result
    }

    fn var_value(&self, at: At<'_>, name: &str) -> EResult<Value<'a>> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| self.error_at(at, format!("undefined variable: {name}")))
    }

    fn set_var(&mut self, at: At<'_>, name: &str, value: Value<'a>) -> EResult<()> {
        match self.vars.iter_mut().rev().find(|(n, _)| *n == name) {
            Some(slot) => {
                slot.1 = value;
                Ok(())
            }
            None => Err(self.error_at(at, format!("undefined variable: {name}"))),
        }
    }

    fn set_top_var(&mut self, n: usize, value: Value<'a>) {
        let len = self.vars.len();
        if let Some(slot) = len.checked_sub(n).and_then(|i| self.vars.get_mut(i)) {
            slot.1 = value;
        }
    }

    fn walk_list(&mut self, dot: &Value<'a>, list: &'a [Node]) -> EResult<Flow> {
        for node in list {
            let flow = self.walk(dot, node)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn walk(&mut self, dot: &Value<'a>, node: &'a Node) -> EResult<Flow> {
        self.step(At::Node(node))?;
        match node {
            Node::Text { text, .. } => self.write(At::Node(node), text)?,
            Node::Action { pipe, .. } => {
                let value = self.eval_pipeline(dot, pipe)?;
                if pipe.decl.is_empty() {
                    let text = match &value {
                        Value::Missing => Cow::Borrowed("<no value>"),
                        other => Cow::Owned(display(other)),
                    };
                    self.write(At::Node(node), &text)?;
                }
            }
            Node::If(branch) => {
                return self.nested(At::Node(node), |s| s.walk_if_or_with(false, dot, branch));
            }
            Node::With(branch) => {
                return self.nested(At::Node(node), |s| s.walk_if_or_with(true, dot, branch));
            }
            Node::Range(branch) => {
                let mark = self.vars.len();
                let result = self.nested(At::Node(node), |s| s.walk_range(dot, node, branch));
                self.vars.truncate(mark);
                result?;
            }
            Node::Template { name, pipe, .. } => self.walk_template(dot, node, name, pipe.as_ref())?,
            Node::Break { .. } => return Ok(Flow::Break),
            Node::Continue { .. } => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn walk_if_or_with(&mut self, is_with: bool, dot: &Value<'a>, branch: &'a Branch) -> EResult<Flow> {
        let mark = self.vars.len();
        let result = self.eval_pipeline(dot, &branch.pipe).and_then(|value| {
            if value.is_true() {
                if is_with {
                    self.walk_list(&value, &branch.list)
                } else {
                    self.walk_list(dot, &branch.list)
                }
            } else if let Some(else_list) = &branch.else_list {
                self.walk_list(dot, else_list)
            } else {
                Ok(Flow::Normal)
            }
        });
        self.vars.truncate(mark);
        result
    }

    fn walk_range(&mut self, dot: &Value<'a>, node: &'a Node, branch: &'a Branch) -> EResult<()> {
        let value = self.eval_pipeline(dot, &branch.pipe)?;
        let mark = self.vars.len();
        match value {
            Value::Seq(items) if !items.is_empty() => {
                for (i, item) in items.iter().enumerate() {
                    let index = Value::Int(i as i64);
                    if self.one_iteration(branch, mark, index, Value::from_json(item))? == Flow::Break {
                        break;
                    }
                }
                return Ok(());
            }
            Value::Map(map) if !map.is_empty() => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                for (key, item) in entries {
                    let key = Value::Str(Cow::Borrowed(key.as_str()));
                    if self.one_iteration(branch, mark, key, Value::from_json(item))? == Flow::Break {
                        break;
                    }
                }
                return Ok(());
            }
            Value::Int(n) => {
                if branch.pipe.decl.len() > 1 {
                    return Err(self.error_at(
                        At::Node(node),
                        format!("can't use {n} to iterate over more than one variable"),
                    ));
                }
                if n > 0 {
                    for i in 0..n {
                        let flow = self.one_iteration(branch, mark, Value::Int(i), Value::Int(i))?;
                        if flow == Flow::Break {
                            break;
                        }
                    }
                    return Ok(());
                }
            }
            Value::Missing | Value::Nil | Value::Seq(_) | Value::Map(_) => {}
            other => {
                return Err(self.error_at(
                    At::Node(node),
                    format!("range can't iterate over {}", display(&other)),
                ));
            }
        }
        if let Some(else_list) = &branch.else_list {
            self.walk_list(dot, else_list)?;
        }
        Ok(())
    }

    fn one_iteration(
        &mut self,
        branch: &'a Branch,
        mark: usize,
        index: Value<'a>,
        elem: Value<'a>,
    ) -> EResult<Flow> {
        let pipe = &branch.pipe;
        let at = At::Pipe(pipe);
        if let Some(first) = pipe.decl.first() {
            if pipe.is_assign {
                let value = if pipe.decl.len() > 1 {
                    index.clone()
                } else {
                    elem.clone()
                };
                self.set_var(at, first, value)?;
            } else {
                self.set_top_var(1, elem.clone());
            }
        }
        if let Some(second) = pipe.decl.get(1) {
            if pipe.is_assign {
                self.set_var(at, second, elem.clone())?;
            } else {
                self.set_top_var(2, index);
            }
        }
        let flow = self.walk_list(&elem, &branch.list);
        self.vars.truncate(mark);
        flow
    }

    fn walk_template(
        &mut self,
        dot: &Value<'a>,
        node: &'a Node,
        name: &str,
        pipe: Option<&'a Pipe>,
    ) -> EResult<()> {
        let Some(tree) = self.trees.get(name) else {
            return Err(self.error_at(
                At::Node(node),
                format!("template {} not defined", go_quote(name)),
            ));
        };
        self.nested(At::Node(node), |s| {
            let dot = match pipe {
                Some(pipe) => s.eval_pipeline(dot, pipe)?,
                None => Value::Missing,
            };
            let saved_vars = std::mem::replace(&mut s.vars, vec![("$", dot.clone())]);
            let saved_name = std::mem::replace(&mut s.tmpl_name, tree.name.as_str());
            let result = s.walk_list(&dot, &tree.root);
            s.tmpl_name = saved_name;
            s.vars = saved_vars;
            result.map(|_| ())
        })
    }

    fn eval_pipeline(&mut self, dot: &Value<'a>, pipe: &'a Pipe) -> EResult<Value<'a>> {
        let mut value = None;
        for cmd in &pipe.cmds {
            let result = self.eval_command(dot, cmd, value.take())?;
            // A nil result carries no value into the next stage.
            value = Some(match result {
                Value::Nil => Value::Missing,
                other => other,
            });
        }
        let value = value.unwrap_or(Value::Missing);
        for name in &pipe.decl {
            if pipe.is_assign {
                self.set_var(At::Pipe(pipe), name, value.clone())?;
            } else {
                self.vars.push((name.as_str(), value.clone()));
            }
        }
        Ok(value)
    }

    fn not_a_function(
        &self,
        at: At<'_>,
        args: &[Operand],
        final_value: &Option<Value<'a>>,
    ) -> EResult<()> {
        if args.len() > 1 || final_value.is_some() {
            let first = args.first().map(ToString::to_string).unwrap_or_default();
            return Err(self.error_at(at, format!("can't give argument to non-function {first}")));
        }
        Ok(())
    }

    fn eval_command(
        &mut self,
        dot: &Value<'a>,
        cmd: &'a Command,
        final_value: Option<Value<'a>>,
    ) -> EResult<Value<'a>> {
        self.step(At::Command(cmd))?;
        let Some(first) = cmd.args.first() else {
            return Err(self.error_at(At::Command(cmd), "empty command"));
        };
        let at = At::Operand(first);
        match &first.kind {
            OperandKind::Field(idents) => {
                self.eval_field_chain(dot.clone(), first, idents, &cmd.args, final_value)
            }
            OperandKind::Chain(..) => self.eval_chain(dot, first, &cmd.args, final_value),
            OperandKind::Identifier(name) => {
                self.eval_function(dot, first, name, At::Command(cmd), &cmd.args, final_value)
            }
            OperandKind::Pipe(pipe) => {
                self.not_a_function(at, &cmd.args, &final_value)?;
                self.nested(at, |s| s.eval_pipeline(dot, pipe))
            }
            OperandKind::Variable(idents) => {
                self.eval_variable(first, idents, &cmd.args, final_value)
            }
            OperandKind::Bool(b) => {
                self.not_a_function(at, &cmd.args, &final_value)?;
                Ok(Value::Bool(*b))
            }
            OperandKind::Dot => {
                self.not_a_function(at, &cmd.args, &final_value)?;
                Ok(dot.clone())
            }
            OperandKind::Nil => {
                self.not_a_function(at, &cmd.args, &final_value)?;
                Err(self.error_at(at, "nil is not a command"))
            }
            OperandKind::Number(number) => {
                self.not_a_function(at, &cmd.args, &final_value)?;
                self.ideal_constant(first, number)
            }
            OperandKind::String { text, .. } => {
                self.not_a_function(at, &cmd.args, &final_value)?;
                Ok(Value::Str(Cow::Borrowed(text)))
            }
        }
    }

    fn ideal_constant(&self, node: &Operand, number: &Number) -> EResult<Value<'a>> {
        match number.value {
            Constant::Int(i) => Ok(Value::Int(i)),
            Constant::Float(f) => Ok(Value::Float(f)),
            Constant::Overflow => Err(self.error_at(
                At::Operand(node),
                format!("{} overflows int", number.text),
            )),
        }
    }

    fn eval_variable(
        &mut self,
        node: &'a Operand,
        idents: &'a [String],
        args: &'a [Operand],
        final_value: Option<Value<'a>>,
    ) -> EResult<Value<'a>> {
        let at = At::Operand(node);
        let Some((name, fields)) = idents.split_first() else {
            return Err(self.error_at(at, "empty variable"));
        };
        let value = self.var_value(at, name)?;
        if fields.is_empty() {
            self.not_a_function(at, args, &final_value)?;
            return Ok(value);
        }
        self.eval_field_chain(value, node, fields, args, final_value)
    }

    fn eval_chain(
        &mut self,
        dot: &Value<'a>,
        node: &'a Operand,
        args: &'a [Operand],
        final_value: Option<Value<'a>>,
    ) -> EResult<Value<'a>> {
        let OperandKind::Chain(inner, fields) = &node.kind else {
            return Err(self.error_at(At::Operand(node), "internal error: not a chain"));
        };
        if inner.kind == OperandKind::Nil {
            return Err(self.error_at(
                At::Operand(node),
                format!("indirection through explicit nil in {node}"),
            ));
        }
        let receiver = self.eval_arg(dot, Param::Value, inner)?;
        self.eval_field_chain(receiver, node, fields, args, final_value)
    }

    fn eval_field_chain(
        &self,
        receiver: Value<'a>,
        node: &'a Operand,
        idents: &'a [String],
        args: &'a [Operand],
        final_value: Option<Value<'a>>,
    ) -> EResult<Value<'a>> {
        let Some((last, leading)) = idents.split_last() else {
            return Err(self.error_at(At::Operand(node), "internal error: no fields"));
        };
        let mut receiver = receiver;
        for ident in leading {
            receiver = self.eval_field(node, ident, &[], None, receiver)?;
        }
        self.eval_field(node, last, args, final_value, receiver)
    }

    fn eval_field(
        &self,
        node: &Operand,
        name: &str,
        args: &[Operand],
        final_value: Option<Value<'a>>,
        receiver: Value<'a>,
    ) -> EResult<Value<'a>> {
        let at = At::Operand(node);
        match receiver {
            Value::Missing if self.opts.missing_key == MissingKey::Error => Err(self.error_at(
                at,
                format!("nil data; no entry for key {}", go_quote(name)),
            )),
            Value::Missing | Value::Nil => Err(self.error_at(
                at,
                format!("nil pointer evaluating interface {{}}.{name}"),
            )),
            Value::Map(map) => {
                if args.len() > 1 || final_value.is_some() {
                    return Err(self.error_at(
                        at,
                        format!("{name} is not a method but has arguments"),
                    ));
                }
                match map.get(name) {
                    Some(entry) => Ok(Value::from_json(entry)),
                    None => match self.opts.missing_key {
                        MissingKey::Default | MissingKey::Invalid => Ok(Value::Missing),
                        MissingKey::Zero => Ok(Value::Nil),
                        MissingKey::Error => Err(self.error_at(
                            at,
                            format!("map has no entry for key {}", go_quote(name)),
                        )),
                    },
                }
            }
            other => Err(self.error_at(
                at,
                format!("can't evaluate field {name} in type {}", other.type_name()),
            )),
        }
    }

    fn eval_function(
        &mut self,
        dot: &Value<'a>,
        ident: &'a Operand,
        name: &str,
        cmd: At<'a>,
        args: &'a [Operand],
        final_value: Option<Value<'a>>,
    ) -> EResult<Value<'a>> {
        let at = At::Operand(ident);
        let Some(builtin) = Builtin::lookup(name) else {
            return Err(self.error_at(at, format!("{} is not a defined function", go_quote(name))));
        };
        let args = args.get(1..).unwrap_or(&[]);
        let arity = builtin.arity();
        let num_in = args.len() + usize::from(final_value.is_some());
        if arity.variadic {
            if num_in < arity.fixed {
                return Err(self.error_at(
                    at,
                    format!(
                        "wrong number of args for {name}: want at least {} got {}",
                        arity.fixed,
                        args.len()
                    ),
                ));
            }
        } else if num_in != arity.fixed {
            return Err(self.error_at(
                at,
                format!("wrong number of args for {name}: want {} got {num_in}", arity.fixed),
            ));
        }

        if matches!(builtin, Builtin::And | Builtin::Or) {
            let stop_on = builtin == Builtin::Or;
            let mut value = Value::Missing;
            for arg in args {
                value = self.eval_arg(dot, Param::Value, arg)?;
                if value.is_true() == stop_on {
                    return Ok(value);
                }
            }
            if let Some(last) = final_value {
                value = last;
            }
            return Ok(value);
        }

        let mut argv = Vec::with_capacity(num_in);
        for (i, arg) in args.iter().enumerate() {
            argv.push(self.eval_arg(dot, builtin.param(i), arg)?);
        }
        if let Some(last) = final_value {
            let param = builtin.param(args.len());
            argv.push(self.validate(at, param, last)?);
        }
        let callee = args.first().map(ToString::to_string).unwrap_or_default();
        funcs::invoke(builtin, argv, &callee)
            .map_err(|err| self.error_at(cmd, format!("error calling {name}: {err}")))
    }

    fn validate(&self, at: At<'_>, param: Param, value: Value<'a>) -> EResult<Value<'a>> {
        match (param, value) {
            (Param::Value, value) => Ok(value),
            (Param::Any, Value::Missing) => Ok(Value::Nil),
            (Param::Any, value) => Ok(value),
            (Param::Str, value @ Value::Str(_)) => Ok(value),
            (Param::Str, Value::Missing) => Err(self.error_at(at, "invalid value; expected string")),
            (Param::Str, other) => Err(self.error_at(
                at,
                format!(
                    "wrong type for value; expected string; got {}",
                    other.type_name()
                ),
            )),
        }
    }

    fn eval_arg(&mut self, dot: &Value<'a>, param: Param, arg: &'a Operand) -> EResult<Value<'a>> {
        let at = At::Operand(arg);
        let value = match &arg.kind {
            OperandKind::Dot => dot.clone(),
            OperandKind::Nil => {
                return match param {
                    Param::Any => Ok(Value::Nil),
                    Param::Value => Err(self.error_at(at, "cannot assign nil to reflect.Value")),
                    Param::Str => Err(self.error_at(at, "cannot assign nil to string")),
                };
            }
            OperandKind::Field(idents) => self.eval_field_chain(dot.clone(), arg, idents, std::slice::from_ref(arg), None)?,
            OperandKind::Variable(idents) => self.eval_variable(arg, idents, &[], None)?,
            OperandKind::Pipe(pipe) => self.nested(at, |s| s.eval_pipeline(dot, pipe))?,
            OperandKind::Identifier(name) => {
                self.eval_function(dot, arg, name, at, &[], None)?
            }
            OperandKind::Chain(..) => self.eval_chain(dot, arg, &[], None)?,
            OperandKind::String { text, .. } => return Ok(Value::Str(Cow::Borrowed(text))),
            OperandKind::Bool(_) | OperandKind::Number(_) if param == Param::Str => {
                return Err(self.error_at(at, format!("expected string; found {arg}")));
            }
            OperandKind::Bool(b) => return Ok(Value::Bool(*b)),
            OperandKind::Number(number) => return self.ideal_constant(arg, number),
        };
        self.validate(at, param, value)
    }
}
