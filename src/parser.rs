//! Machine grammar.
//!
//! Recursive descent with ordered choice and backtracking over an assembled
//! [`Skeleton`]. Each production builds its compiled closure directly, so a
//! successful parse yields the declarations of the program.
//!
//! Line breaks are skipped everywhere except between the fields of a
//! `#Name field…` form: a line break ends the field list. Operator runs
//! are matched by prefix, so `@#Go` reads as `@` followed by `#`.
//!
//! On failure the error reports the furthest position any alternative
//! reached and everything that was expected there.

use crate::error::CompileError;
use statelang_core::{
    cond, effect, event, expr, machine, pattern, Action, BinaryOp, CompareOp, Declaration,
    EffectFn, Evaluator, HostFn, Matcher, Predicate, Rule, Step, Value,
};
use statelang_syntax::{Literal, Node, Position, Skeleton, Token, TokenKind};
use std::cell::RefCell;

const KEYWORDS: &[&str] = &[
    "states", "actions", "start", "extends", "if", "after", "enter", "exit", "dispatch", "await",
    "exec", "in", "not", "is", "true", "false", "null", "undefined",
];

enum Fail {
    /// This alternative does not apply; try the next one.
    Mismatch,
    /// Stop parsing.
    Fatal(CompileError),
}

type PResult<T> = Result<T, Fail>;

#[derive(Debug, Default)]
struct Furthest {
    position: Option<Position>,
    expected: Vec<String>,
    found: String,
}

impl Furthest {
    fn record(&mut self, position: Position, expected: &str, found: impl FnOnce() -> String) {
        match self.position {
            Some(p) if p.offset > position.offset => {}
            Some(p) if p.offset == position.offset => {
                if !self.expected.iter().any(|e| e == expected) {
                    self.expected.push(expected.to_string());
                }
            }
            _ => {
                self.position = Some(position);
                self.expected = vec![expected.to_string()];
                self.found = found();
            }
        }
    }

    fn into_error(self) -> CompileError {
        CompileError::Parse {
            expected: self.expected.join(" or "),
            found: self.found,
            position: self.position.unwrap_or_else(Position::start),
        }
    }
}

fn closing(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

struct Parser<'a> {
    skeleton: &'a Skeleton<Value>,
    nodes: &'a [Node<Value>],
    pos: usize,
    /// Bytes already consumed from the operator token at `pos`.
    split: usize,
    end: Position,
    furthest: &'a RefCell<Furthest>,
}

impl<'a> Parser<'a> {
    fn new(skeleton: &'a Skeleton<Value>, furthest: &'a RefCell<Furthest>) -> Self {
        Self {
            skeleton,
            nodes: skeleton.root(),
            pos: 0,
            split: 0,
            end: skeleton.end_position(),
            furthest,
        }
    }

    fn child(&self, nodes: &'a [Node<Value>], end: Position) -> Self {
        Self {
            skeleton: self.skeleton,
            nodes,
            pos: 0,
            split: 0,
            end,
            furthest: self.furthest,
        }
    }

    // ---- cursor -------------------------------------------------------

    fn skip_lines(&mut self) {
        if self.split != 0 {
            return;
        }
        while let Some(Node::Token(tok)) = self.nodes.get(self.pos) {
            if !tok.is_line() {
                break;
            }
            self.pos += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_lines();
        self.pos >= self.nodes.len()
    }

    fn at_line_or_end(&self) -> bool {
        if self.split != 0 {
            return false;
        }
        match self.nodes.get(self.pos) {
            Some(Node::Token(tok)) => tok.is_line(),
            Some(Node::Structure(_)) => false,
            None => true,
        }
    }

    fn peek_token(&mut self) -> Option<&'a Token<Value>> {
        self.skip_lines();
        let nodes = self.nodes;
        match nodes.get(self.pos) {
            Some(Node::Token(tok)) => Some(tok),
            _ => None,
        }
    }

    fn bump(&mut self) {
        self.pos += 1;
        self.split = 0;
    }

    fn position(&self) -> Position {
        match self.nodes.get(self.pos) {
            Some(Node::Token(tok)) => Position {
                offset: tok.position.offset + self.split,
                line: tok.position.line,
                column: tok.position.column + self.split,
            },
            Some(Node::Structure(id)) => self.skeleton.structure(*id).position(),
            None => self.end,
        }
    }

    fn describe(&self) -> String {
        match self.nodes.get(self.pos) {
            Some(Node::Token(tok)) => match &tok.kind {
                TokenKind::Line => "line break".to_string(),
                TokenKind::Value(Literal::Str(s)) => format!("string {:?}", s),
                TokenKind::Value(Literal::Number(n)) => format!("number {}", Value::from(*n)),
                TokenKind::Value(Literal::Injected(v)) => format!("injected {}", v.type_name()),
                _ => format!("'{}'", &tok.text[self.split..]),
            },
            Some(Node::Structure(id)) => {
                format!("'{}'", self.skeleton.structure(*id).open_text())
            }
            None => "end of input".to_string(),
        }
    }

    fn expected(&self, what: &str) -> Fail {
        self.furthest
            .borrow_mut()
            .record(self.position(), what, || self.describe());
        Fail::Mismatch
    }

    // ---- combinators --------------------------------------------------

    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let (pos, split) = (self.pos, self.split);
        let result = f(self);
        if let Err(Fail::Mismatch) = result {
            self.pos = pos;
            self.split = split;
        }
        result
    }

    fn optional<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<Option<T>> {
        match self.attempt(f) {
            Ok(value) => Ok(Some(value)),
            Err(Fail::Mismatch) => Ok(None),
            Err(fatal) => Err(fatal),
        }
    }

    fn many<T>(&mut self, mut f: impl FnMut(&mut Self) -> PResult<T>) -> PResult<Vec<T>> {
        let mut items = Vec::new();
        loop {
            let before = (self.pos, self.split);
            match self.optional(&mut f)? {
                Some(item) => items.push(item),
                None => break,
            }
            if (self.pos, self.split) == before {
                break;
            }
        }
        Ok(items)
    }

    /// Items separated by `,` inside a bracket, trailing comma allowed.
    fn comma_list<T>(&mut self, mut item: impl FnMut(&mut Self) -> PResult<T>) -> PResult<Vec<T>> {
        let mut items = Vec::new();
        if self.at_end() {
            return Ok(items);
        }
        items.push(item(self)?);
        while self.optional(|p| p.symbol(","))?.is_some() {
            if self.at_end() {
                break;
            }
            items.push(item(self)?);
        }
        Ok(items)
    }

    /// Fields of a `#Name` form, up to the end of the line.
    fn line_fields<T>(&mut self, mut field: impl FnMut(&mut Self) -> PResult<T>) -> PResult<Vec<T>> {
        let mut fields = Vec::new();
        while !self.at_line_or_end() {
            match self.optional(&mut field)? {
                Some(f) => fields.push(f),
                None => break,
            }
        }
        Ok(fields)
    }

    /// Parses the inside of a bracketed structure opened by `open`.
    fn group<T>(
        &mut self,
        open: &str,
        f: impl FnOnce(&mut Parser<'a>) -> PResult<T>,
    ) -> PResult<T> {
        self.skip_lines();
        if self.split == 0 {
            if let Some(Node::Structure(id)) = self.nodes.get(self.pos) {
                let structure = self.skeleton.structure(*id);
                if structure.open_text() == open {
                    let mut inner = self.child(&structure.children, structure.end_position());
                    let value = f(&mut inner)?;
                    if !inner.at_end() {
                        return Err(inner.expected(&format!("'{}'", closing(open))));
                    }
                    self.bump();
                    return Ok(value);
                }
            }
        }
        Err(self.expected(&format!("'{}'", open)))
    }

    // ---- terminals ----------------------------------------------------

    fn symbol(&mut self, text: &str) -> PResult<()> {
        if let Some(tok) = self.peek_token() {
            let is_symbol = matches!(tok.kind, TokenKind::Punctuation | TokenKind::Operator);
            if is_symbol && tok.text[self.split..].starts_with(text) {
                self.split += text.len();
                if self.split >= tok.text.len() {
                    self.bump();
                }
                return Ok(());
            }
        }
        Err(self.expected(&format!("'{}'", text)))
    }

    /// An identifier with exactly this text, keyword or not.
    fn word(&mut self, text: &str) -> PResult<()> {
        if self.split == 0 {
            if let Some(tok) = self.peek_token() {
                if tok.identifier() == Some(text) {
                    self.bump();
                    return Ok(());
                }
            }
        }
        Err(self.expected(&format!("'{}'", text)))
    }

    /// Any identifier, keywords included. Used for tag names.
    fn name(&mut self) -> PResult<String> {
        if self.split == 0 {
            if let Some(name) = self.peek_token().and_then(Token::identifier) {
                self.bump();
                return Ok(name.to_string());
            }
        }
        Err(self.expected("name"))
    }

    fn ident(&mut self) -> PResult<String> {
        if self.split == 0 {
            if let Some(name) = self.peek_token().and_then(Token::identifier) {
                if !KEYWORDS.contains(&name) {
                    self.bump();
                    return Ok(name.to_string());
                }
            }
        }
        Err(self.expected("identifier"))
    }

    fn string(&mut self) -> PResult<String> {
        if let Some(Literal::Str(s)) = self.peek_token().and_then(Token::literal) {
            self.bump();
            return Ok(s.clone());
        }
        Err(self.expected("string"))
    }

    fn number(&mut self) -> PResult<f64> {
        if let Some(Literal::Number(n)) = self.peek_token().and_then(Token::literal) {
            self.bump();
            return Ok(*n);
        }
        Err(self.expected("number"))
    }

    fn callable(&mut self) -> PResult<HostFn> {
        if let Some(Literal::Injected(Value::Callable(f))) =
            self.peek_token().and_then(Token::literal)
        {
            self.bump();
            return Ok(f.clone());
        }
        Err(self.expected("host function"))
    }

    fn literal(&mut self) -> PResult<Value> {
        let keywords = [
            ("true", Value::Bool(true)),
            ("false", Value::Bool(false)),
            ("null", Value::Null),
            ("undefined", Value::Undefined),
        ];
        for (keyword, value) in keywords {
            if self.optional(|p| p.word(keyword))?.is_some() {
                return Ok(value);
            }
        }
        let value = match self.peek_token().and_then(Token::literal) {
            Some(Literal::Str(s)) => Some(Value::String(s.clone())),
            Some(Literal::Number(n)) => Some(Value::Number(*n)),
            Some(Literal::Injected(Value::Callable(_))) | None => None,
            Some(Literal::Injected(v)) => Some(v.clone()),
        };
        match value {
            Some(value) => {
                self.bump();
                Ok(value)
            }
            None => Err(self.expected("literal")),
        }
    }

    fn field_key(&mut self) -> PResult<String> {
        if let Some(key) = self.optional(Self::ident)? {
            return Ok(key);
        }
        self.string()
    }

    // ---- program ------------------------------------------------------

    fn program(&mut self) -> PResult<Vec<Declaration>> {
        let mut declarations = vec![self.declaration()?];
        declarations.extend(self.many(Self::declaration)?);
        declarations.push(self.rule()?);
        declarations.extend(self.many(Self::rule)?);
        if !self.at_end() {
            return Err(self.expected("end of input"));
        }
        Ok(declarations)
    }

    fn declaration(&mut self) -> PResult<Declaration> {
        if let Some(states) = self.optional(|p| {
            p.word("states")?;
            p.symbol("=")?;
            p.tag_bind_list()
        })? {
            return Ok(Declaration::States(states));
        }
        if let Some(actions) = self.optional(|p| {
            p.word("actions")?;
            p.symbol("=")?;
            p.tag_bind_list()
        })? {
            return Ok(Declaration::Actions(actions));
        }
        self.word("start")?;
        self.symbol("=")?;
        Ok(Declaration::Start(self.tag_expr()?))
    }

    fn tag_bind_list(&mut self) -> PResult<Vec<Matcher>> {
        let mut patterns = vec![self.tag_bind()?];
        patterns.extend(self.many(|p| {
            p.symbol("|")?;
            p.tag_bind()
        })?);
        Ok(patterns)
    }

    fn rule(&mut self) -> PResult<Declaration> {
        if let Some(rule) = self.optional(|p| {
            let on = p.or_event()?;
            p.symbol("->")?;
            let effect = p.or_effect()?;
            Ok(Rule::new(on, effect))
        })? {
            return Ok(Declaration::Rule(rule));
        }
        let dest = self.tag_expr()?;
        self.word("extends")?;
        let src = self.tag_bind()?;
        Ok(Declaration::Extends(machine::extension(dest, src)))
    }

    // ---- events -------------------------------------------------------

    fn or_event(&mut self) -> PResult<Step> {
        let head = self.cond_event()?;
        let tail = self.many(|p| {
            p.symbol("|")?;
            p.cond_event()
        })?;
        Ok(alternatives_of(head, tail, event::alternatives))
    }

    fn cond_event(&mut self) -> PResult<Step> {
        if let Some(step) = self.optional(|p| {
            let state = p.state()?;
            p.symbol("@")?;
            let on = p.event()?;
            let mut steps = vec![state, on];
            if let Some(cond) = p.optional(|p| {
                p.word("if")?;
                p.cond()
            })? {
                steps.push(event::condition(cond));
            }
            Ok(event::sequence(steps))
        })? {
            return Ok(step);
        }
        self.group("(", Self::or_event)
    }

    fn or_state(&mut self) -> PResult<Step> {
        let head = self.and_state()?;
        let tail = self.many(|p| {
            p.symbol("|")?;
            p.and_state()
        })?;
        Ok(alternatives_of(head, tail, event::alternatives))
    }

    fn and_state(&mut self) -> PResult<Step> {
        let head = match self.optional(Self::state)? {
            Some(state) => state,
            None => event::condition(self.cond()?),
        };
        let tail = self.many(|p| {
            p.symbol("&")?;
            Ok(event::condition(p.cond()?))
        })?;
        if tail.is_empty() {
            return Ok(head);
        }
        let mut steps = vec![head];
        steps.extend(tail);
        Ok(event::sequence(steps))
    }

    fn state(&mut self) -> PResult<Step> {
        if let Some(step) = self.optional(|p| p.group("(", Self::or_state))? {
            return Ok(step);
        }
        Ok(event::state(self.tag_bind()?))
    }

    fn event(&mut self) -> PResult<Step> {
        if let Some(matcher) = self.optional(Self::tag_bind)? {
            return Ok(event::event(matcher));
        }

        self.skip_lines();
        let position = self.position();
        if self.optional(|p| p.word("after"))?.is_some() {
            self.number()?;
            if self.optional(|p| p.word("s"))?.is_none() {
                self.word("ms")?;
            }
            return Err(Fail::Fatal(CompileError::Unsupported {
                feature: "timed 'after' events".to_string(),
                position,
            }));
        }
        for keyword in ["enter", "exit"] {
            if self.optional(|p| p.word(keyword))?.is_some() {
                if self.optional(Self::state)?.is_none() {
                    self.cond()?;
                }
                return Err(Fail::Fatal(CompileError::Unsupported {
                    feature: format!("'{}' events", keyword),
                    position,
                }));
            }
        }
        Err(self.expected("event"))
    }

    // ---- conditions ---------------------------------------------------

    fn or_cond(&mut self) -> PResult<Predicate> {
        let head = self.and_cond()?;
        let tail = self.many(|p| {
            p.symbol("|")?;
            p.and_cond()
        })?;
        Ok(alternatives_of(head, tail, cond::any))
    }

    fn and_cond(&mut self) -> PResult<Predicate> {
        let head = self.cond()?;
        let tail = self.many(|p| {
            p.symbol("&")?;
            p.cond()
        })?;
        Ok(alternatives_of(head, tail, cond::all))
    }

    fn cond(&mut self) -> PResult<Predicate> {
        if let Some(pred) = self.optional(|p| p.group("(", Self::or_cond))? {
            return Ok(pred);
        }
        if let Some(f) = self.optional(Self::callable)? {
            return Ok(cond::host(f));
        }
        if let Some(pred) = self.optional(|p| {
            let l = p.expr()?;
            let op = p.cond_op()?;
            let r = p.expr()?;
            Ok(cond::compare(l, op, r))
        })? {
            return Ok(pred);
        }
        Ok(cond::truthy(self.expr()?))
    }

    fn cond_op(&mut self) -> PResult<CompareOp> {
        let symbols = [
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Ne),
            (">=", CompareOp::Ge),
            (">", CompareOp::Gt),
            ("<=", CompareOp::Le),
            ("<", CompareOp::Lt),
        ];
        for (text, op) in symbols {
            if self.optional(|p| p.symbol(text))?.is_some() {
                return Ok(op);
            }
        }
        if self.optional(|p| p.word("in"))?.is_some() {
            return Ok(CompareOp::In);
        }
        if self
            .optional(|p| {
                p.word("not")?;
                p.word("in")
            })?
            .is_some()
        {
            return Ok(CompareOp::NotIn);
        }
        self.word("is")?;
        if self.optional(|p| p.word("not"))?.is_some() {
            return Ok(CompareOp::IsNot);
        }
        Ok(CompareOp::Is)
    }

    // ---- effects ------------------------------------------------------

    fn or_effect(&mut self) -> PResult<EffectFn> {
        let head = self.cond_effect()?;
        let tail = self.many(|p| {
            p.symbol("|")?;
            p.cond_effect()
        })?;
        Ok(alternatives_of(head, tail, effect::alternatives))
    }

    fn cond_effect(&mut self) -> PResult<EffectFn> {
        let effect = self.and_effect()?;
        match self.optional(|p| {
            p.word("if")?;
            p.cond()
        })? {
            Some(cond) => Ok(effect::guarded(effect, cond)),
            None => Ok(effect),
        }
    }

    fn and_effect(&mut self) -> PResult<EffectFn> {
        if let Some(effect) = self.optional(|p| {
            let next = p.tag_expr()?;
            let actions = p.many(Self::joined_effect)?;
            Ok(effect::with_next_state(next, actions))
        })? {
            return Ok(effect);
        }
        let mut actions = vec![self.effect()?];
        actions.extend(self.many(Self::joined_effect)?);
        Ok(effect::actions_only(actions))
    }

    fn joined_effect(&mut self) -> PResult<Action> {
        self.symbol("&")?;
        self.effect()
    }

    fn effect(&mut self) -> PResult<Action> {
        if let Some(nested) = self.optional(|p| p.group("(", Self::or_effect))? {
            return Ok(effect::nested(nested));
        }
        if self.optional(|p| p.word("dispatch"))?.is_some() {
            return Ok(effect::dispatch(self.tag_expr()?));
        }
        if self.optional(|p| p.word("await"))?.is_some() {
            return Ok(effect::await_host(self.callable()?));
        }
        if self.optional(|p| p.word("exec"))?.is_some() {
            return Ok(effect::exec(self.callable()?));
        }
        Err(self.expected("effect"))
    }

    // ---- patterns -----------------------------------------------------

    fn tag_bind(&mut self) -> PResult<Matcher> {
        if let Some(matcher) = self.optional(|p| {
            p.symbol("#")?;
            let name = p.name()?;
            let fields = p.line_fields(Self::bind_pair)?;
            Ok(pattern::tagged(name, fields))
        })? {
            return Ok(matcher);
        }
        self.binding()
    }

    fn binding(&mut self) -> PResult<Matcher> {
        if let Some(fields) =
            self.optional(|p| p.group("{", |p| p.comma_list(Self::bind_pair)))?
        {
            return Ok(pattern::object(fields));
        }
        if let Some(items) = self.optional(|p| p.group("[", |p| p.comma_list(Self::binding)))? {
            return Ok(pattern::array(items));
        }
        if let Some(matcher) = self.optional(|p| p.group("(", Self::tag_bind))? {
            return Ok(matcher);
        }
        if self.optional(|p| p.word("_"))?.is_some() {
            return Ok(pattern::wildcard());
        }
        if let Some(value) = self.optional(Self::literal)? {
            return Ok(pattern::literal(value));
        }
        Ok(pattern::binder(self.ident()?))
    }

    fn bind_pair(&mut self) -> PResult<pattern::FieldPattern> {
        if let Some(pair) = self.optional(|p| {
            let key = p.field_key()?;
            p.symbol(":")?;
            Ok((key, p.binding()?))
        })? {
            return Ok(pair);
        }
        Ok(pattern::shorthand(self.ident()?))
    }

    // ---- expressions --------------------------------------------------

    fn tag_expr(&mut self) -> PResult<Evaluator> {
        if let Some(eval) = self.optional(|p| {
            p.symbol("#")?;
            let name = p.name()?;
            let fields = p.line_fields(Self::expr_pair)?;
            Ok(expr::tagged(name, fields))
        })? {
            return Ok(eval);
        }
        self.expr()
    }

    fn expr(&mut self) -> PResult<Evaluator> {
        let head = self.mul_expr()?;
        let tail = self.many(|p| {
            let op = p.binary_op(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)])?;
            Ok((op, p.mul_expr()?))
        })?;
        Ok(expr::chain(head, tail))
    }

    fn mul_expr(&mut self) -> PResult<Evaluator> {
        let head = self.pow_expr()?;
        let tail = self.many(|p| {
            let op = p.binary_op(&[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ])?;
            Ok((op, p.pow_expr()?))
        })?;
        Ok(expr::chain(head, tail))
    }

    /// `**` is right-associative.
    fn pow_expr(&mut self) -> PResult<Evaluator> {
        let base = self.base_expr()?;
        match self.optional(|p| {
            p.symbol("**")?;
            p.pow_expr()
        })? {
            Some(exponent) => Ok(expr::binary(BinaryOp::Pow, base, exponent)),
            None => Ok(base),
        }
    }

    fn binary_op(&mut self, ops: &[(&str, BinaryOp)]) -> PResult<BinaryOp> {
        for (text, op) in ops {
            if self.optional(|p| p.symbol(text))?.is_some() {
                return Ok(*op);
            }
        }
        Err(Fail::Mismatch)
    }

    fn base_expr(&mut self) -> PResult<Evaluator> {
        if let Some(eval) = self.optional(|p| p.group("(", Self::tag_expr))? {
            return Ok(eval);
        }
        if let Some(items) = self.optional(|p| p.group("[", |p| p.comma_list(Self::expr)))? {
            return Ok(expr::list(items));
        }
        if let Some(fields) =
            self.optional(|p| p.group("{", |p| p.comma_list(Self::expr_pair)))?
        {
            return Ok(expr::record(fields));
        }
        if let Some(value) = self.optional(Self::literal)? {
            return Ok(expr::constant(value));
        }
        if let Some(name) = self.optional(Self::ident)? {
            return Ok(expr::lookup(name));
        }
        if let Some(f) = self.optional(Self::callable)? {
            return Ok(expr::host_call(f));
        }
        Err(self.expected("expression"))
    }

    fn expr_pair(&mut self) -> PResult<expr::FieldExpr> {
        if let Some(pair) = self.optional(|p| {
            let key = p.field_key()?;
            p.symbol(":")?;
            Ok((key, p.expr()?))
        })? {
            return Ok(pair);
        }
        Ok(expr::shorthand(self.ident()?))
    }
}

/// Returns `head` alone, or all operands combined with `combine`.
fn alternatives_of<T>(head: T, tail: Vec<T>, combine: impl FnOnce(Vec<T>) -> T) -> T {
    if tail.is_empty() {
        return head;
    }
    let mut all = Vec::with_capacity(tail.len() + 1);
    all.push(head);
    all.extend(tail);
    combine(all)
}

/// Parses an assembled program into its declarations.
pub fn parse_program(skeleton: &Skeleton<Value>) -> Result<Vec<Declaration>, CompileError> {
    let furthest = RefCell::new(Furthest::default());
    let mut parser = Parser::new(skeleton, &furthest);
    let result = parser.program();
    match result {
        Ok(declarations) => Ok(declarations),
        Err(Fail::Fatal(e)) => Err(e),
        Err(Fail::Mismatch) => Err(furthest.into_inner().into_error()),
    }
}
