use percent_encoding::percent_decode_str;
use serde_json::{Map, Number, Value};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::lexer::{Spanned, Token};
use super::{Limits, ScriptError, ScriptOutcome};

/// Names that refer to the global object itself.
const GLOBAL_ALIASES: &[&str] = &["window", "self", "globalThis"];

/// Statements and operators outside the literal subset.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "try", "catch", "finally", "throw", "new",
    "class", "delete", "in", "instanceof", "yield", "await", "async", "import", "export", "with",
    "debugger", "this", "super", "break", "continue",
];

/// Largest gap an index assignment may open in an array.
const MAX_ARRAY_GAP: usize = 1024;

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Copied bytes that cost one step.
const BYTES_PER_STEP: usize = 16;

/// Rough per-node overhead used when sizing values.
const NODE_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Global,
    Json,
    JsonParse,
    Object,
    Identity,
    DecodeUriComponent,
}

#[derive(Debug)]
pub struct FunctionDef {
    params: Vec<String>,
    body_start: usize,
    body_end: usize,
}

#[derive(Debug, Clone)]
pub enum Eval {
    Undefined,
    Value(Value),
    Function(Rc<FunctionDef>),
    Builtin(Builtin),
}

enum Flow {
    Normal,
    Return(Eval),
}

struct Target {
    root: String,
    path: Vec<String>,
}

pub struct Interpreter<'t> {
    tokens: &'t [Spanned],
    pos: usize,
    end: usize,
    lex_error: Option<ScriptError>,
    limits: &'t Limits,
    steps: usize,
    depth: usize,
    /// Non-zero while evaluating a branch that short-circuited away.
    skipping: usize,
    /// Non-zero under `typeof`, where unknown names are not errors.
    lenient: usize,
    globals: Map<String, Value>,
    global_values: HashMap<String, Eval>,
    /// Hoisted `var` names that read as `undefined` until assigned.
    declared: HashSet<String>,
    frames: Vec<HashMap<String, Eval>>,
}

impl<'t> Interpreter<'t> {
    pub fn new(tokens: &'t [Spanned], lex_error: Option<ScriptError>, limits: &'t Limits) -> Self {
        Self {
            tokens,
            pos: 0,
            end: tokens.len(),
            lex_error,
            limits,
            steps: 0,
            depth: 0,
            skipping: 0,
            lenient: 0,
            globals: Map::new(),
            global_values: HashMap::new(),
            declared: HashSet::new(),
            frames: Vec::new(),
        }
    }

    pub fn run(mut self) -> ScriptOutcome {
        let error = self.program().err();
        ScriptOutcome {
            globals: self.globals,
            error,
        }
    }

    fn program(&mut self) -> Result<(), ScriptError> {
        while self.pos < self.end {
            if let Flow::Return(_) = self.statement()? {
                return Err(self.syntax("return outside of a function"));
            }
        }
        match self.lex_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    // ---- token plumbing -------------------------------------------------

    fn tick(&mut self) -> Result<(), ScriptError> {
        self.charge(1)
    }

    fn charge(&mut self, steps: usize) -> Result<(), ScriptError> {
        self.steps = self.steps.saturating_add(steps);
        if self.steps > self.limits.max_steps {
            return Err(ScriptError::BudgetExhausted);
        }
        Ok(())
    }

    /// Pay for a copy of `value` leaving its binding.
    fn charge_copy(&mut self, value: &Eval) -> Result<(), ScriptError> {
        if let Eval::Value(value) = value {
            let size = measure(value, self.limits)?;
            self.charge(size / BYTES_PER_STEP)?;
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            self.depth -= 1;
            return Err(ScriptError::TooDeep(self.limits.max_depth));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        let index = self.pos + ahead;
        (index < self.end).then(|| &self.tokens[index].token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.offset)
            .or_else(|| self.tokens.last().map(|t| t.offset))
            .unwrap_or(0)
    }

    fn syntax(&self, message: &str) -> ScriptError {
        ScriptError::Syntax {
            offset: self.offset(),
            message: message.to_string(),
        }
    }

    fn unsupported(&self, construct: &'static str) -> ScriptError {
        ScriptError::Unsupported {
            offset: self.offset(),
            construct,
        }
    }

    fn end_of_input(&self) -> ScriptError {
        self.lex_error
            .clone()
            .unwrap_or_else(|| self.syntax("unexpected end of script"))
    }

    fn next(&mut self) -> Result<Token, ScriptError> {
        let token = self.peek().cloned().ok_or_else(|| self.end_of_input())?;
        self.tick()?;
        if let Token::Str(text) = &token {
            self.charge(text.len() / BYTES_PER_STEP)?;
        }
        self.pos += 1;
        Ok(token)
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> Result<bool, ScriptError> {
        if self.is_punct(punct) {
            self.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect_punct(&mut self, punct: &'static str) -> Result<(), ScriptError> {
        if self.eat_punct(punct)? {
            return Ok(());
        }
        if self.peek().is_none() {
            return Err(self.end_of_input());
        }
        Err(self.syntax(&format!("expected `{punct}`")))
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            _ => Err(self.syntax("expected identifier")),
        }
    }

    // ---- statements -----------------------------------------------------

    fn statement(&mut self) -> Result<Flow, ScriptError> {
        self.tick()?;
        let Some(token) = self.peek().cloned() else {
            return Err(self.end_of_input());
        };

        match token {
            Token::Punct(";") => {
                self.next()?;
                return Ok(Flow::Normal);
            }
            Token::Punct("{") => return Err(self.unsupported("block statement")),
            Token::Ident(word) => match word.as_str() {
                "var" | "let" | "const" => {
                    self.next()?;
                    self.declarations()?;
                }
                "return" => {
                    self.next()?;
                    if self.frames.is_empty() {
                        return Err(self.syntax("return outside of a function"));
                    }
                    let value = if self.peek().is_none() || self.is_punct(";") || self.is_punct("}") {
                        Eval::Undefined
                    } else {
                        self.expression()?
                    };
                    self.eat_punct(";")?;
                    return Ok(Flow::Return(value));
                }
                "function" if matches!(self.peek_at(1), Some(Token::Ident(_))) => {
                    self.next()?;
                    let name = self.ident()?;
                    let function = self.function_rest()?;
                    self.declare(name, function);
                }
                keyword if UNSUPPORTED_KEYWORDS.contains(&keyword) => {
                    return Err(self.unsupported("statement"));
                }
                _ => {
                    self.expression()?;
                }
            },
            _ => {
                self.expression()?;
            }
        }

        self.eat_punct(";")?;
        Ok(Flow::Normal)
    }

    fn declarations(&mut self) -> Result<(), ScriptError> {
        loop {
            if self.is_punct("{") || self.is_punct("[") {
                return Err(self.unsupported("destructuring"));
            }
            let name = self.ident()?;
            if self.frames.is_empty() {
                self.declared.insert(name.clone());
            }
            if self.eat_punct("=")? {
                let value = self.assignment()?;
                self.declare(name, value);
            } else if let Some(frame) = self.frames.last_mut() {
                frame.entry(name).or_insert(Eval::Undefined);
            }
            if !self.eat_punct(",")? {
                return Ok(());
            }
        }
    }

    fn declare(&mut self, name: String, value: Eval) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name, value);
        } else {
            self.set_global(name, value);
        }
    }

    fn set_global(&mut self, name: String, value: Eval) {
        match value {
            Eval::Value(value) => {
                self.global_values.remove(&name);
                self.globals.insert(name, value);
            }
            Eval::Undefined => {
                self.global_values.remove(&name);
                self.globals.remove(&name);
            }
            other => {
                self.globals.remove(&name);
                self.global_values.insert(name, other);
            }
        }
    }

    // ---- expressions ----------------------------------------------------

    fn expression(&mut self) -> Result<Eval, ScriptError> {
        let mut value = self.assignment()?;
        while self.eat_punct(",")? {
            value = self.assignment()?;
        }
        Ok(value)
    }

    fn assignment(&mut self) -> Result<Eval, ScriptError> {
        self.enter()?;
        let result = self.assignment_inner();
        self.leave();
        result
    }

    fn assignment_inner(&mut self) -> Result<Eval, ScriptError> {
        let start = self.pos;
        if let Some(target) = self.try_target()?
            && self.is_punct("=")
        {
            self.next()?;
            let value = self.assignment()?;
            if self.skipping == 0 {
                self.charge_copy(&value)?;
                self.assign(&target, value.clone())?;
            }
            return Ok(value);
        }
        self.pos = start;
        self.conditional()
    }

    /// Parse `name`, `name.a`, `name["a"]`... if that is what comes next.
    fn try_target(&mut self) -> Result<Option<Target>, ScriptError> {
        let root = match self.peek() {
            Some(Token::Ident(root)) => root.clone(),
            _ => return Ok(None),
        };
        if is_reserved(&root) {
            return Ok(None);
        }
        self.next()?;

        let mut path = Vec::new();
        loop {
            if self.is_punct(".") {
                let Some(Token::Ident(name)) = self.peek_at(1).cloned() else {
                    return Ok(None);
                };
                self.next()?;
                self.next()?;
                path.push(name);
            } else if self.is_punct("[") {
                self.next()?;
                let key = self.expression()?;
                if !self.eat_punct("]")? {
                    return Ok(None);
                }
                if self.skipping > 0 {
                    path.push(String::new());
                } else {
                    path.push(property_key(&key)?);
                }
            } else {
                return Ok(Some(Target { root, path }));
            }
        }
    }

    fn assign(&mut self, target: &Target, value: Eval) -> Result<(), ScriptError> {
        if let Some(slot) = self
            .frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(&target.root))
        {
            let Some(first) = target.path.first() else {
                *slot = value;
                return Ok(());
            };
            return match slot {
                Eval::Value(container) => set_path(container, &target.path, value),
                Eval::Undefined => Err(ScriptError::Type(format!(
                    "cannot set properties of undefined (setting '{first}')"
                ))),
                _ => Ok(()),
            };
        }

        let (root, path) = if GLOBAL_ALIASES.contains(&target.root.as_str()) {
            match target.path.split_first() {
                Some((first, rest)) => (first.as_str(), rest),
                None => return Err(ScriptError::Type("cannot reassign the global object".into())),
            }
        } else {
            (target.root.as_str(), target.path.as_slice())
        };

        if path.is_empty() {
            self.set_global(root.to_string(), value);
            return Ok(());
        }
        match self.globals.get_mut(root) {
            Some(container) => set_path(container, path, value),
            None if self.global_values.contains_key(root) => Ok(()),
            None => Err(ScriptError::Reference { name: root.to_string() }),
        }
    }

    /// Run `parse` with side effects and lookups suppressed unless `active`.
    fn branch(
        &mut self,
        active: bool,
        parse: impl FnOnce(&mut Self) -> Result<Eval, ScriptError>,
    ) -> Result<Eval, ScriptError> {
        if !active {
            self.skipping += 1;
        }
        let result = parse(self);
        if !active {
            self.skipping -= 1;
        }
        result
    }

    fn conditional(&mut self) -> Result<Eval, ScriptError> {
        let condition = self.logical_or()?;
        if !self.eat_punct("?")? {
            return Ok(condition);
        }
        let truthy = is_truthy(&condition);
        let when_true = self.branch(truthy, Self::assignment)?;
        self.expect_punct(":")?;
        let when_false = self.branch(!truthy, Self::assignment)?;
        Ok(if truthy { when_true } else { when_false })
    }

    fn logical_or(&mut self) -> Result<Eval, ScriptError> {
        let mut left = self.logical_and()?;
        loop {
            let take_right = if self.eat_punct("||")? {
                !is_truthy(&left)
            } else if self.eat_punct("??")? {
                is_nullish(&left)
            } else {
                return Ok(left);
            };
            let right = self.branch(take_right, Self::logical_and)?;
            if take_right {
                left = right;
            }
        }
    }

    fn logical_and(&mut self) -> Result<Eval, ScriptError> {
        let mut left = self.equality()?;
        while self.eat_punct("&&")? {
            let take_right = is_truthy(&left);
            let right = self.branch(take_right, Self::equality)?;
            if take_right {
                left = right;
            }
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Eval, ScriptError> {
        let mut left = self.additive()?;
        loop {
            let negate = if self.eat_punct("===")? || self.eat_punct("==")? {
                false
            } else if self.eat_punct("!==")? || self.eat_punct("!=")? {
                true
            } else {
                return Ok(left);
            };
            let right = self.additive()?;
            let equal = match (&left, &right) {
                (Eval::Value(a), Eval::Value(b)) => a == b,
                (Eval::Undefined, Eval::Undefined) => true,
                _ => false,
            };
            left = Eval::Value(Value::Bool(equal != negate));
        }
    }

    fn additive(&mut self) -> Result<Eval, ScriptError> {
        let mut left = self.unary()?;
        loop {
            let add = if self.eat_punct("+")? {
                true
            } else if self.eat_punct("-")? {
                false
            } else {
                return Ok(left);
            };
            let right = self.unary()?;
            left = if add && (is_string(&left) || is_string(&right)) {
                self.concat(&left, &right)?
            } else if add {
                number_value(to_number(&left) + to_number(&right))
            } else {
                number_value(to_number(&left) - to_number(&right))
            };
        }
    }

    fn concat(&mut self, left: &Eval, right: &Eval) -> Result<Eval, ScriptError> {
        if self.skipping > 0 {
            return Ok(Eval::Undefined);
        }
        let (left, right) = (to_js_string(left), to_js_string(right));
        let len = left.len() + right.len();
        if len > self.limits.max_value_bytes {
            return Err(ScriptError::ValueTooLarge {
                limit: self.limits.max_value_bytes,
            });
        }
        self.charge(len / BYTES_PER_STEP)?;
        Ok(Eval::Value(Value::String(left + &right)))
    }

    fn unary(&mut self) -> Result<Eval, ScriptError> {
        self.enter()?;
        let result = self.unary_inner();
        self.leave();
        result
    }

    fn unary_inner(&mut self) -> Result<Eval, ScriptError> {
        if self.eat_punct("!")? {
            let value = self.unary()?;
            return Ok(Eval::Value(Value::Bool(!is_truthy(&value))));
        }
        if self.eat_punct("-")? {
            let value = self.unary()?;
            return Ok(number_value(-to_number(&value)));
        }
        if self.eat_punct("+")? {
            let value = self.unary()?;
            return Ok(number_value(to_number(&value)));
        }
        match self.peek() {
            Some(Token::Ident(word)) if word == "void" => {
                self.next()?;
                self.unary()?;
                Ok(Eval::Undefined)
            }
            Some(Token::Ident(word)) if word == "typeof" => {
                self.next()?;
                self.lenient += 1;
                let value = self.unary();
                self.lenient -= 1;
                Ok(Eval::Value(Value::String(type_of(&value?).to_string())))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Eval, ScriptError> {
        let mut value = self.primary()?;
        let mut short_circuited = false;
        loop {
            if self.is_punct(".") || self.is_punct("?.") {
                let optional = self.is_punct("?.");
                self.next()?;
                if optional && is_nullish(&value) {
                    short_circuited = true;
                }
                if optional && (self.is_punct("(") || self.is_punct("[")) {
                    continue;
                }
                let name = self.ident()?;
                value = if short_circuited {
                    Eval::Undefined
                } else {
                    self.member(value, &name)?
                };
            } else if self.eat_punct("[")? {
                let key = self.expression()?;
                self.expect_punct("]")?;
                value = if short_circuited || self.skipping > 0 {
                    Eval::Undefined
                } else {
                    let key = property_key(&key)?;
                    self.member(value, &key)?
                };
            } else if self.eat_punct("(")? {
                let args = self.arguments()?;
                value = if short_circuited {
                    Eval::Undefined
                } else {
                    self.call(value, args)?
                };
            } else {
                return Ok(value);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Eval>, ScriptError> {
        let mut args = Vec::new();
        loop {
            if self.eat_punct(")")? {
                return Ok(args);
            }
            if self.is_punct("...") {
                return Err(self.unsupported("spread argument"));
            }
            args.push(self.assignment()?);
            if !self.eat_punct(",")? {
                self.expect_punct(")")?;
                return Ok(args);
            }
        }
    }

    fn primary(&mut self) -> Result<Eval, ScriptError> {
        let offset = self.offset();
        match self.next()? {
            Token::Number(number) => Ok(number_value(number)),
            Token::Str(text) => Ok(Eval::Value(Value::String(text))),
            Token::Punct("[") => self.array_literal(),
            Token::Punct("{") => self.object_literal(),
            Token::Punct("(") => {
                if self.arrow_ahead() {
                    return Err(self.unsupported("arrow function"));
                }
                let value = self.expression()?;
                self.expect_punct(")")?;
                Ok(value)
            }
            Token::Punct(_) => Err(ScriptError::Syntax {
                offset,
                message: "unexpected token".to_string(),
            }),
            Token::Ident(name) => {
                if self.is_punct("=>") {
                    return Err(self.unsupported("arrow function"));
                }
                match name.as_str() {
                    "true" => Ok(Eval::Value(Value::Bool(true))),
                    "false" => Ok(Eval::Value(Value::Bool(false))),
                    "null" => Ok(Eval::Value(Value::Null)),
                    "undefined" => Ok(Eval::Undefined),
                    "NaN" => Ok(number_value(f64::NAN)),
                    "Infinity" => Ok(number_value(f64::INFINITY)),
                    "function" => {
                        if matches!(self.peek(), Some(Token::Ident(_))) {
                            self.next()?;
                        }
                        self.function_rest()
                    }
                    keyword if UNSUPPORTED_KEYWORDS.contains(&keyword) => Err(ScriptError::Unsupported {
                        offset,
                        construct: "keyword",
                    }),
                    _ => self.lookup(&name),
                }
            }
        }
    }

    /// `(a, b) =>` after an opening parenthesis.
    fn arrow_ahead(&self) -> bool {
        let mut ahead = 0;
        loop {
            match self.peek_at(ahead) {
                Some(Token::Ident(_)) | Some(Token::Punct(",")) => ahead += 1,
                Some(Token::Punct(")")) => return matches!(self.peek_at(ahead + 1), Some(Token::Punct("=>"))),
                _ => return false,
            }
        }
    }

    fn array_literal(&mut self) -> Result<Eval, ScriptError> {
        let mut items = Vec::new();
        loop {
            if self.eat_punct("]")? {
                break;
            }
            if self.eat_punct(",")? {
                items.push(Value::Null);
                continue;
            }
            if self.is_punct("...") {
                return Err(self.unsupported("spread element"));
            }
            let item = self.assignment()?;
            items.push(match item {
                Eval::Value(value) => value,
                _ => Value::Null,
            });
            if !self.eat_punct(",")? {
                self.expect_punct("]")?;
                break;
            }
        }
        Ok(Eval::Value(Value::Array(items)))
    }

    fn object_literal(&mut self) -> Result<Eval, ScriptError> {
        let mut map = Map::new();
        loop {
            if self.eat_punct("}")? {
                break;
            }
            let (key, shorthand_allowed) = match self.next()? {
                Token::Ident(name) => (name, true),
                Token::Str(text) => (text, false),
                Token::Number(number) => (number_key(number), false),
                Token::Punct("[") => {
                    let key = self.assignment()?;
                    self.expect_punct("]")?;
                    let key = if self.skipping > 0 {
                        String::new()
                    } else {
                        property_key(&key)?
                    };
                    (key, false)
                }
                Token::Punct("...") => return Err(self.unsupported("object spread")),
                _ => return Err(self.syntax("expected property name")),
            };

            let value = if self.eat_punct(":")? {
                self.assignment()?
            } else if shorthand_allowed && (self.is_punct(",") || self.is_punct("}")) {
                self.lookup(&key)?
            } else if self.is_punct("(") {
                return Err(self.unsupported("method definition"));
            } else {
                return Err(self.syntax("expected `:`"));
            };
            if let Eval::Value(value) = value {
                map.insert(key, value);
            }

            if !self.eat_punct(",")? {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Eval::Value(Value::Object(map)))
    }

    /// Parameters and body of a `function`, recorded by token range.
    fn function_rest(&mut self) -> Result<Eval, ScriptError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        loop {
            if self.eat_punct(")")? {
                break;
            }
            if self.is_punct("{") || self.is_punct("[") || self.is_punct("...") {
                return Err(self.unsupported("parameter pattern"));
            }
            params.push(self.ident()?);
            if self.is_punct("=") {
                return Err(self.unsupported("default parameter"));
            }
            if !self.eat_punct(",")? {
                self.expect_punct(")")?;
                break;
            }
        }

        self.expect_punct("{")?;
        let body_start = self.pos;
        let mut depth = 1usize;
        while depth > 0 {
            match self.next()? {
                Token::Punct("{") => depth += 1,
                Token::Punct("}") => depth -= 1,
                _ => {}
            }
        }
        Ok(Eval::Function(Rc::new(FunctionDef {
            params,
            body_start,
            body_end: self.pos - 1,
        })))
    }

    // ---- runtime --------------------------------------------------------

    fn lookup(&mut self, name: &str) -> Result<Eval, ScriptError> {
        let local = self.frames.iter().rev().find_map(|frame| frame.get(name)).cloned();
        if let Some(value) = local {
            self.charge_copy(&value)?;
            return Ok(value);
        }
        if GLOBAL_ALIASES.contains(&name) {
            return Ok(Eval::Builtin(Builtin::Global));
        }
        match self.lookup_global(name) {
            Eval::Undefined if self.skipping == 0 && self.lenient == 0 && !self.declared.contains(name) => {
                Err(ScriptError::Reference { name: name.to_string() })
            }
            value => {
                self.charge_copy(&value)?;
                Ok(value)
            }
        }
    }

    fn lookup_global(&self, name: &str) -> Eval {
        if let Some(value) = self.globals.get(name) {
            return Eval::Value(value.clone());
        }
        if let Some(value) = self.global_values.get(name) {
            return value.clone();
        }
        match name {
            "JSON" => Eval::Builtin(Builtin::Json),
            "Object" => Eval::Builtin(Builtin::Object),
            "decodeURIComponent" | "decodeURI" => Eval::Builtin(Builtin::DecodeUriComponent),
            _ => Eval::Undefined,
        }
    }

    fn member(&mut self, value: Eval, name: &str) -> Result<Eval, ScriptError> {
        if self.skipping > 0 {
            return Ok(Eval::Undefined);
        }
        self.tick()?;
        let found = match value {
            Eval::Value(Value::Object(map)) => map.get(name).cloned().map(Eval::Value),
            Eval::Value(Value::Array(items)) if name == "length" => {
                Some(number_value(items.len() as f64))
            }
            Eval::Value(Value::Array(items)) => name
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index).cloned())
                .map(Eval::Value),
            Eval::Value(Value::String(text)) if name == "length" => {
                Some(number_value(text.encode_utf16().count() as f64))
            }
            Eval::Value(Value::Null) => {
                return Err(ScriptError::Type(format!(
                    "cannot read properties of null (reading '{name}')"
                )));
            }
            Eval::Undefined => {
                return Err(ScriptError::Type(format!(
                    "cannot read properties of undefined (reading '{name}')"
                )));
            }
            Eval::Builtin(Builtin::Global) => {
                let value = self.lookup_global(name);
                self.charge_copy(&value)?;
                Some(value)
            }
            Eval::Builtin(Builtin::Json) if name == "parse" => Some(Eval::Builtin(Builtin::JsonParse)),
            Eval::Builtin(Builtin::Object) if matches!(name, "freeze" | "seal" | "preventExtensions") => {
                Some(Eval::Builtin(Builtin::Identity))
            }
            _ => None,
        };
        Ok(found.unwrap_or(Eval::Undefined))
    }

    fn call(&mut self, callee: Eval, args: Vec<Eval>) -> Result<Eval, ScriptError> {
        if self.skipping > 0 {
            return Ok(Eval::Undefined);
        }
        match callee {
            Eval::Function(function) => self.invoke(&function, args),
            Eval::Builtin(Builtin::JsonParse) => {
                let Some(Eval::Value(Value::String(text))) = args.first() else {
                    return Err(ScriptError::Type("JSON.parse expects a string".into()));
                };
                for _ in 0..text.len() / 256 {
                    self.tick()?;
                }
                serde_json::from_str::<Value>(text)
                    .map(Eval::Value)
                    .map_err(|err| self.syntax(&format!("JSON.parse: {err}")))
            }
            Eval::Builtin(Builtin::DecodeUriComponent) => {
                let Some(Eval::Value(Value::String(text))) = args.first() else {
                    return Ok(Eval::Value(Value::String("undefined".into())));
                };
                percent_decode_str(text)
                    .decode_utf8()
                    .map(|decoded| Eval::Value(Value::String(decoded.into_owned())))
                    .map_err(|_| ScriptError::Type("URI malformed".into()))
            }
            Eval::Builtin(Builtin::Identity) => Ok(args.into_iter().next().unwrap_or(Eval::Undefined)),
            _ => Err(ScriptError::Type("value is not a function".into())),
        }
    }

    fn invoke(&mut self, function: &FunctionDef, args: Vec<Eval>) -> Result<Eval, ScriptError> {
        self.enter()?;
        let mut frame: HashMap<String, Eval> = function
            .params
            .iter()
            .map(|param| (param.clone(), Eval::Undefined))
            .collect();
        for (param, arg) in function.params.iter().zip(args) {
            frame.insert(param.clone(), arg);
        }

        let saved = (self.pos, self.end);
        self.pos = function.body_start;
        self.end = function.body_end;
        self.frames.push(frame);

        let result = self.run_body();

        self.frames.pop();
        (self.pos, self.end) = saved;
        self.leave();
        result
    }

    fn run_body(&mut self) -> Result<Eval, ScriptError> {
        while self.pos < self.end {
            if let Flow::Return(value) = self.statement()? {
                return Ok(value);
            }
        }
        Ok(Eval::Undefined)
    }
}

/// Approximate size of `value` in bytes. Fails once the size passes
/// `max_value_bytes` or the nesting passes `max_depth`.
fn measure(value: &Value, limits: &Limits) -> Result<usize, ScriptError> {
    let mut size = 0usize;
    let mut pending = vec![(value, 0usize)];
    while let Some((value, depth)) = pending.pop() {
        if depth > limits.max_depth {
            return Err(ScriptError::TooDeep(limits.max_depth));
        }
        size += NODE_BYTES;
        match value {
            Value::String(text) => size += text.len(),
            Value::Array(items) => pending.extend(items.iter().map(|item| (item, depth + 1))),
            Value::Object(map) => {
                for (key, item) in map {
                    size += key.len();
                    pending.push((item, depth + 1));
                }
            }
            _ => {}
        }
        if size > limits.max_value_bytes {
            return Err(ScriptError::ValueTooLarge {
                limit: limits.max_value_bytes,
            });
        }
    }
    Ok(size)
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "true" | "false" | "null" | "undefined" | "NaN" | "Infinity" | "function" | "void" | "typeof"
    ) || UNSUPPORTED_KEYWORDS.contains(&word)
}

fn child_mut<'v>(value: &'v mut Value, key: &str) -> Option<&'v mut Value> {
    match value {
        Value::Object(map) => map.get_mut(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(move |index| items.get_mut(index)),
        _ => None,
    }
}

fn set_path(target: &mut Value, path: &[String], value: Eval) -> Result<(), ScriptError> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(());
    };
    let mut current = target;
    for key in parents {
        current = child_mut(current, key).ok_or_else(|| {
            ScriptError::Type(format!("cannot set properties of undefined (reading '{key}')"))
        })?;
    }

    let value = match value {
        Eval::Value(value) => Some(value),
        Eval::Undefined => None,
        // Functions and host objects never end up inside data.
        Eval::Function(_) | Eval::Builtin(_) => return Ok(()),
    };

    match current {
        Value::Object(map) => {
            match value {
                Some(value) => map.insert(last.clone(), value),
                None => map.remove(last),
            };
            Ok(())
        }
        Value::Array(items) => {
            let Ok(index) = last.parse::<usize>() else {
                return Ok(());
            };
            let value = value.unwrap_or(Value::Null);
            if index < items.len() {
                items[index] = value;
            } else if index - items.len() <= MAX_ARRAY_GAP {
                items.resize(index, Value::Null);
                items.push(value);
            } else {
                return Err(ScriptError::Type(format!("array index {index} out of range")));
            }
            Ok(())
        }
        Value::Null => Err(ScriptError::Type(format!(
            "cannot set properties of null (setting '{last}')"
        ))),
        _ => Ok(()),
    }
}

fn is_truthy(value: &Eval) -> bool {
    match value {
        Eval::Undefined | Eval::Value(Value::Null) => false,
        Eval::Value(Value::Bool(b)) => *b,
        Eval::Value(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Eval::Value(Value::String(s)) => !s.is_empty(),
        _ => true,
    }
}

fn is_nullish(value: &Eval) -> bool {
    matches!(value, Eval::Undefined | Eval::Value(Value::Null))
}

fn is_string(value: &Eval) -> bool {
    matches!(value, Eval::Value(Value::String(_)))
}

fn type_of(value: &Eval) -> &'static str {
    match value {
        Eval::Undefined => "undefined",
        Eval::Value(Value::Bool(_)) => "boolean",
        Eval::Value(Value::Number(_)) => "number",
        Eval::Value(Value::String(_)) => "string",
        Eval::Value(_) => "object",
        Eval::Function(_) => "function",
        Eval::Builtin(Builtin::JsonParse | Builtin::Identity | Builtin::DecodeUriComponent) => "function",
        Eval::Builtin(_) => "object",
    }
}

fn to_number(value: &Eval) -> f64 {
    match value {
        Eval::Value(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Eval::Value(Value::Bool(b)) => f64::from(u8::from(*b)),
        Eval::Value(Value::Null) => 0.0,
        Eval::Value(Value::String(s)) if s.trim().is_empty() => 0.0,
        Eval::Value(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn to_js_string(value: &Eval) -> String {
    match value {
        Eval::Undefined => "undefined".to_string(),
        Eval::Value(Value::String(s)) => s.clone(),
        Eval::Value(Value::Number(n)) => n.as_f64().map(number_key).unwrap_or_default(),
        Eval::Value(Value::Bool(b)) => b.to_string(),
        Eval::Value(Value::Null) => "null".to_string(),
        Eval::Value(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(&Eval::Value(other.clone())),
            })
            .collect::<Vec<_>>()
            .join(","),
        Eval::Value(Value::Object(_)) => "[object Object]".to_string(),
        Eval::Function(_) | Eval::Builtin(_) => "function".to_string(),
    }
}

/// JSON has no NaN or Infinity; both become `null`. Integral values in the
/// safe range become integers so that `1` and `1.0` compare equal.
fn number_value(number: f64) -> Eval {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < MAX_SAFE_INTEGER {
        return Eval::Value(Value::from(number as i64));
    }
    Eval::Value(Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null))
}

fn number_key(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < MAX_SAFE_INTEGER {
        return (number as i64).to_string();
    }
    number.to_string()
}

fn property_key(key: &Eval) -> Result<String, ScriptError> {
    match key {
        Eval::Value(Value::String(s)) => Ok(s.clone()),
        Eval::Value(Value::Number(n)) => Ok(n.as_f64().map(number_key).unwrap_or_default()),
        Eval::Value(Value::Bool(b)) => Ok(b.to_string()),
        Eval::Value(Value::Null) => Ok("null".to_string()),
        Eval::Undefined => Ok("undefined".to_string()),
        _ => Err(ScriptError::Type("unsupported property key".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Limits, run_script};
    use serde_json::json;

    #[test]
    fn test_ternary_and_concatenation() {
        let outcome = run_script(
            "var base = 'https://example.com'; window.u = base + '/a/' + 1; window.t = base ? 'yes' : missing;",
            &Limits::default(),
        );
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.globals["u"], json!("https://example.com/a/1"));
        assert_eq!(outcome.globals["t"], json!("yes"));
    }

    #[test]
    fn test_locals_shadow_globals() {
        let outcome = run_script(
            "var a = {v: 1}; window.r = (function(a){ a.v = 2; var b = a; return b }({v: 3})); window.a2 = a;",
            &Limits::default(),
        );
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.globals["r"], json!({"v": 2}));
        assert_eq!(outcome.globals["a2"], json!({"v": 1}));
    }

    #[test]
    fn test_hoisted_var_reads_as_undefined() {
        let outcome = run_script(
            "var CNN = CNN || {}; CNN.contentModel = {analytics: {author: 'By Jane Doe, CNN'}};",
            &Limits::default(),
        );
        assert_eq!(outcome.error, None);
        assert_eq!(
            outcome.globals["CNN"],
            json!({"contentModel": {"analytics": {"author": "By Jane Doe, CNN"}}})
        );
    }

    #[test]
    fn test_array_holes_and_length() {
        let outcome = run_script("var xs = [1,,3]; window.n = xs.length; xs[4] = 5; window.xs = xs;", &Limits::default());
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.globals["n"], json!(3));
        assert_eq!(outcome.globals["xs"], json!([1, null, 3, null, 5]));
    }

    #[test]
    fn test_property_of_undefined_is_a_type_error() {
        let outcome = run_script("var a = {}; a.b.c = 1;", &Limits::default());
        assert!(matches!(outcome.error, Some(super::ScriptError::Type(_))));
    }

    #[test]
    fn test_arrow_functions_are_unsupported() {
        let outcome = run_script("window.f = (a, b) => a;", &Limits::default());
        assert!(matches!(outcome.error, Some(super::ScriptError::Unsupported { .. })));
    }

    #[test]
    fn test_optional_chaining() {
        let outcome = run_script("var a = null; window.x = a?.b.c; window.y = {b: 2}?.b;", &Limits::default());
        assert_eq!(outcome.error, None);
        assert!(outcome.global("x").is_none());
        assert_eq!(outcome.globals["y"], json!(2));
    }
}
