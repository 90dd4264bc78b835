//! Formula parser
//!
//! A backtracking parser over a fixed operator-precedence table. Function
//! names come from a snapshot of the function registry taken when the
//! grammar is built.
//!
//! Every failed attempt records the offset it failed at; when the whole
//! parse fails, the error points at the furthest such offset and lists
//! everything that would have been accepted there.

use crate::ast::FormulaExpr;
use crate::error::SyntaxError;
use crate::functions::{FunctionDef, FunctionRegistry};
use crate::position::{Locator, Position};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Default limit on nested parentheses and function calls
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Parse a formula with the built-in functions
///
/// # Example
/// ```rust
/// use cellcalc_formula::parse_formula;
///
/// let ast = parse_formula("=1+2").unwrap();
/// let ast = parse_formula("=SUM(A1, 2)*3!").unwrap();
/// let ast = parse_formula("plain text").unwrap();
/// ```
pub fn parse_formula(formula: &str) -> Result<FormulaExpr, SyntaxError> {
    crate::engine::FormulaEngine::builtin().parse(formula)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fixity {
    Prefix,
    Postfix,
    RightAssoc,
    LeftAssoc,
}

/// Operators in order by precedence, tightest first.
/// Order of the levels matters.
const OPERATOR_TABLE: &[(Fixity, &[(char, &str)])] = &[
    (Fixity::Prefix, &[('-', "Negate")]),
    (Fixity::Postfix, &[('!', "Factorial")]),
    (Fixity::RightAssoc, &[('^', "Exponentiate")]),
    (Fixity::LeftAssoc, &[('*', "Multiply"), ('/', "Divide")]),
    (Fixity::LeftAssoc, &[('+', "Add"), ('-', "Subtract")]),
];

#[derive(Debug, Clone)]
struct OperatorLevel {
    fixity: Fixity,
    operators: Vec<(char, Arc<FunctionDef>)>,
}

/// Formula grammar built from a function registry
#[derive(Debug, Clone)]
pub struct Grammar {
    /// Callable names, longest first
    functions: Vec<(String, Arc<FunctionDef>)>,
    levels: Vec<OperatorLevel>,
    max_depth: usize,
}

impl Grammar {
    /// Build a grammar from the registry's current contents and seal the
    /// registry. Functions missing from the registry are not callable;
    /// operators whose function is missing are not recognized.
    pub fn new(registry: &mut FunctionRegistry) -> Self {
        registry.seal();

        let mut functions: Vec<(String, Arc<FunctionDef>)> = registry
            .entries()
            .map(|(name, def)| (name.to_string(), Arc::clone(def)))
            .collect();
        functions.sort_by(|(a, _), (b, _)| (Reverse(a.len()), a).cmp(&(Reverse(b.len()), b)));

        let levels = OPERATOR_TABLE
            .iter()
            .map(|(fixity, ops)| OperatorLevel {
                fixity: *fixity,
                operators: ops
                    .iter()
                    .filter_map(|(symbol, name)| {
                        registry.get(name).map(|def| (*symbol, Arc::clone(def)))
                    })
                    .collect(),
            })
            .collect();

        tracing::debug!(functions = functions.len(), "built formula grammar");
        Self {
            functions,
            levels,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit nesting of parentheses and function calls
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Names callable as `NAME(...)`, longest first
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|(name, _)| name.as_str())
    }

    /// Parse formula text into an AST
    pub fn parse(&self, formula: &str) -> Result<FormulaExpr, SyntaxError> {
        let result = FormulaParser::new(self, formula).parse();
        if let Err(err) = &result {
            tracing::trace!(formula, error = %err, "formula failed to parse");
        }
        result
    }
}

/// Why a parse attempt stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fail {
    /// Try the next alternative
    Backtrack,
    /// Give up on the whole formula
    Abort,
}

type PResult<T> = Result<T, Fail>;

#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    pos: usize,
    last_end: usize,
}

/// Formula parser
struct FormulaParser<'g, 'a> {
    grammar: &'g Grammar,
    input: &'a str,
    pos: usize,
    /// End of the last consumed token, ignoring trailing whitespace
    last_end: usize,
    depth: usize,
    locator: Locator<'a>,
    furthest: Option<usize>,
    expected: BTreeSet<String>,
    aborted: Option<SyntaxError>,
}

impl<'g, 'a> FormulaParser<'g, 'a> {
    fn new(grammar: &'g Grammar, input: &'a str) -> Self {
        Self {
            grammar,
            input,
            pos: 0,
            last_end: 0,
            depth: 0,
            locator: Locator::new(input),
            furthest: None,
            expected: BTreeSet::new(),
            aborted: None,
        }
    }

    fn parse(mut self) -> Result<FormulaExpr, SyntaxError> {
        let parsed = if self.input.starts_with('=') {
            self.bump(1);
            self.parse_expression()
        } else {
            self.expect_at(0, "'='");
            self.parse_immediate()
        };

        match parsed {
            Ok(expr) if self.is_at_end() => return Ok(expr),
            Ok(_) => self.expect_at(self.pos, "end of input"),
            Err(_) => {}
        }
        Err(self.into_error())
    }

    fn into_error(mut self) -> SyntaxError {
        if let Some(err) = self.aborted.take() {
            return err;
        }
        let offset = self.furthest.unwrap_or(self.pos);
        SyntaxError::new(
            self.locator.locate(offset),
            self.expected.into_iter().collect(),
        )
    }

    // === Failure bookkeeping ===

    fn expect_at(&mut self, offset: usize, what: &str) {
        match self.furthest {
            Some(furthest) if offset < furthest => {}
            Some(furthest) if offset == furthest => {
                self.expected.insert(what.to_string());
            }
            _ => {
                self.furthest = Some(offset);
                self.expected.clear();
                self.expected.insert(what.to_string());
            }
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            last_end: self.last_end,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.pos = checkpoint.pos;
        self.last_end = checkpoint.last_end;
    }

    fn enter(&mut self, offset: usize) -> PResult<()> {
        if self.depth >= self.grammar.max_depth {
            let message = format!("at most {} nested levels", self.grammar.max_depth);
            self.aborted = Some(SyntaxError::new(self.locator.locate(offset), vec![message]));
            return Err(Fail::Abort);
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn position(&mut self, offset: usize) -> Position {
        self.locator.locate(offset)
    }

    // === Helper methods ===

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Consume `len` bytes of token text
    fn bump(&mut self, len: usize) {
        self.pos += len;
        self.last_end = self.pos;
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    // === Expressions ===

    /// An operator expression with optional surrounding whitespace
    fn parse_expression(&mut self) -> PResult<FormulaExpr> {
        self.skip_whitespace();
        let expr = self.parse_level(self.grammar.levels.len())?;
        self.skip_whitespace();
        Ok(expr)
    }

    /// Parse everything binding at least as tightly as `levels[level - 1]`;
    /// level 0 is a single unit.
    fn parse_level(&mut self, level: usize) -> PResult<FormulaExpr> {
        let Some(index) = level.checked_sub(1) else {
            return self.parse_unit();
        };

        match self.grammar.levels[index].fixity {
            Fixity::Prefix => self.parse_prefix(index),
            Fixity::Postfix => self.parse_postfix(index),
            Fixity::RightAssoc => self.parse_right_assoc(index),
            Fixity::LeftAssoc => self.parse_left_assoc(index),
        }
    }

    /// Operators may be surrounded by whitespace; nothing is consumed
    /// unless one matches.
    fn eat_operator(&mut self, index: usize) -> Option<Arc<FunctionDef>> {
        let grammar = self.grammar;
        let start = self.checkpoint();
        self.skip_whitespace();

        let found = self.peek_char().and_then(|c| {
            grammar.levels[index]
                .operators
                .iter()
                .find(|(symbol, _)| *symbol == c)
        });

        match found {
            Some((symbol, def)) => {
                self.bump(symbol.len_utf8());
                self.skip_whitespace();
                Some(Arc::clone(def))
            }
            None => {
                for (symbol, _) in &grammar.levels[index].operators {
                    self.expect_at(self.pos, &format!("'{symbol}'"));
                }
                self.restore(start);
                None
            }
        }
    }

    fn parse_prefix(&mut self, index: usize) -> PResult<FormulaExpr> {
        let mut operators = Vec::new();
        while let Some(def) = self.eat_operator(index) {
            operators.push(def);
        }

        let mut expr = self.parse_level(index)?;
        let end = self.position(self.last_end);
        for def in operators.iter().rev() {
            expr = FormulaExpr::FunctionCall(def.build(end, vec![expr]));
        }
        Ok(expr)
    }

    // Postfix and left-associative chains are parsed as flat lists and then
    // folded, so long chains never recurse.
    //
    // INPUT  :: "4!!!"
    // PARSE  :: [4, "!", "!", "!"]
    // FOLD   :: Factorial(Factorial(Factorial(4)))
    fn parse_postfix(&mut self, index: usize) -> PResult<FormulaExpr> {
        let mut expr = self.parse_level(index)?;
        while let Some(def) = self.eat_operator(index) {
            let end = self.position(self.last_end);
            expr = FormulaExpr::FunctionCall(def.build(end, vec![expr]));
        }
        Ok(expr)
    }

    /// `operand (op operand)*`, stopping before the first incomplete pair
    fn parse_chain(
        &mut self,
        index: usize,
    ) -> PResult<(FormulaExpr, Vec<(Arc<FunctionDef>, FormulaExpr, usize)>)> {
        let first = self.parse_level(index)?;
        let mut rest = Vec::new();

        loop {
            let before = self.checkpoint();
            let Some(def) = self.eat_operator(index) else {
                break;
            };
            match self.parse_level(index) {
                Ok(operand) => rest.push((def, operand, self.last_end)),
                Err(Fail::Backtrack) => {
                    self.restore(before);
                    break;
                }
                Err(Fail::Abort) => return Err(Fail::Abort),
            }
        }

        Ok((first, rest))
    }

    // INPUT  :: "1^2^3"
    // PARSE  :: [1, ["^", 2], ["^", 3]]
    // FOLD   :: Exponentiate(1, Exponentiate(2, 3))
    fn parse_right_assoc(&mut self, index: usize) -> PResult<FormulaExpr> {
        let (first, rest) = self.parse_chain(index)?;
        let Some(&(_, _, last_end)) = rest.last() else {
            return Ok(first);
        };
        let end = self.position(last_end);

        let mut operands = Vec::with_capacity(rest.len() + 1);
        let mut operators = Vec::with_capacity(rest.len());
        operands.push(first);
        for (def, operand, _) in rest {
            operators.push(def);
            operands.push(operand);
        }

        let mut acc = operands.pop().ok_or(Fail::Backtrack)?;
        while let (Some(def), Some(left)) = (operators.pop(), operands.pop()) {
            acc = FormulaExpr::FunctionCall(def.build(end, vec![left, acc]));
        }
        Ok(acc)
    }

    // INPUT  :: "1+2+3"
    // PARSE  :: [1, ["+", 2], ["+", 3]]
    // FOLD   :: Add(Add(1, 2), 3)
    fn parse_left_assoc(&mut self, index: usize) -> PResult<FormulaExpr> {
        let (first, rest) = self.parse_chain(index)?;
        let mut acc = first;
        for (def, operand, end) in rest {
            let end = self.position(end);
            acc = FormulaExpr::FunctionCall(def.build(end, vec![acc, operand]));
        }
        Ok(acc)
    }

    // === Units ===

    /// A parenthesized expression, a function call or a value
    fn parse_unit(&mut self) -> PResult<FormulaExpr> {
        let start = self.checkpoint();

        match self.parse_parenthesized() {
            Ok(expr) => return Ok(expr),
            Err(Fail::Abort) => return Err(Fail::Abort),
            Err(Fail::Backtrack) => self.restore(start),
        }

        match self.parse_function_call() {
            Ok(expr) => return Ok(expr),
            Err(Fail::Abort) => return Err(Fail::Abort),
            Err(Fail::Backtrack) => self.restore(start),
        }

        self.parse_value()
    }

    fn parse_parenthesized(&mut self) -> PResult<FormulaExpr> {
        let open = self.pos;
        if self.peek_char() != Some('(') {
            self.expect_at(open, "'('");
            return Err(Fail::Backtrack);
        }

        self.enter(open)?;
        self.bump(1);
        let result = self
            .parse_expression()
            .and_then(|expr| self.close_paren().map(|()| expr));
        self.leave();
        result
    }

    fn close_paren(&mut self) -> PResult<()> {
        if self.peek_char() == Some(')') {
            self.bump(1);
            Ok(())
        } else {
            self.expect_at(self.pos, "')'");
            Err(Fail::Backtrack)
        }
    }

    /// `NAME(arg[, arg...])` where NAME is a registered function
    fn parse_function_call(&mut self) -> PResult<FormulaExpr> {
        let grammar = self.grammar;
        let start = self.pos;
        let rest = self.rest();

        let mut longest_prefix = None;
        let mut callee = None;
        for (name, def) in &grammar.functions {
            if !rest.starts_with(name.as_str()) {
                continue;
            }
            longest_prefix.get_or_insert(name.len());
            if rest[name.len()..].starts_with('(') {
                callee = Some((name.len(), def));
                break;
            }
        }

        let Some((name_len, def)) = callee else {
            match longest_prefix {
                Some(len) => self.expect_at(start + len, "'('"),
                None => self.expect_at(start, "function name"),
            }
            return Err(Fail::Backtrack);
        };

        self.enter(start)?;
        self.bump(name_len + 1);
        let args = self.parse_arguments();
        self.leave();

        let position = self.position(start);
        Ok(FormulaExpr::FunctionCall(def.build(position, args?)))
    }

    fn parse_arguments(&mut self) -> PResult<Vec<FormulaExpr>> {
        let mut args = vec![self.parse_expression()?];

        loop {
            let before = self.checkpoint();
            self.skip_whitespace();
            if self.peek_char() != Some(',') {
                self.expect_at(self.pos, "','");
                self.restore(before);
                break;
            }
            self.bump(1);
            match self.parse_expression() {
                Ok(arg) => args.push(arg),
                Err(Fail::Backtrack) => {
                    self.restore(before);
                    break;
                }
                Err(Fail::Abort) => return Err(Fail::Abort),
            }
        }

        self.close_paren()?;
        Ok(args)
    }

    /// Number, quoted string or reference
    fn parse_value(&mut self) -> PResult<FormulaExpr> {
        let start = self.pos;
        let position = self.position(start);

        match scan_number(self.input, start) {
            Ok(end) => {
                let value = self.number_value(start, end)?;
                self.bump(end - start);
                return Ok(FormulaExpr::number(value, position));
            }
            Err(offset) => self.expect_at(offset, "number"),
        }

        match scan_quoted(self.input, start) {
            Ok((value, end)) => {
                self.bump(end - start);
                return Ok(FormulaExpr::string(value, position));
            }
            Err(offset) => self.expect_at(offset, "string"),
        }

        match scan_reference(self.input, start) {
            Ok(end) => {
                let input = self.input;
                let id = &input[start..end];
                self.bump(end - start);
                Ok(FormulaExpr::reference(id, position))
            }
            Err(offset) => {
                self.expect_at(offset, "reference");
                Err(Fail::Backtrack)
            }
        }
    }

    /// Input without a leading `=`: a lone number, otherwise raw text
    fn parse_immediate(&mut self) -> PResult<FormulaExpr> {
        let start = self.pos;
        let position = self.position(start);

        match scan_number(self.input, start) {
            Ok(end) if !is_raw_string(&self.input[end..]) => {
                let value = self.number_value(start, end)?;
                self.bump(end - start);
                return Ok(FormulaExpr::number(value, position));
            }
            Ok(end) => self.expect_at(end, "number"),
            Err(offset) => self.expect_at(offset, "number"),
        }

        let rest = self.rest();
        if is_raw_string(rest) {
            self.bump(rest.len());
            return Ok(FormulaExpr::string(rest, position));
        }
        self.expect_at(start, "text");
        Err(Fail::Backtrack)
    }

    fn number_value(&mut self, start: usize, end: usize) -> PResult<f64> {
        self.input[start..end].parse::<f64>().map_err(|_| {
            self.expect_at(start, "number");
            Fail::Backtrack
        })
    }
}

// === Lexical rules ===
//
// Each scanner returns the end offset of the token, or the offset at which
// it failed.

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn followed_by_word(input: &str, offset: usize) -> bool {
    input[offset..].chars().next().map_or(false, is_word_char)
}

fn skip_digits(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).map_or(false, u8::is_ascii_digit) {
        i += 1;
    }
    i
}

/// `-?(0|[1-9][0-9]*)([.][0-9]+)?([eE][+-]?[0-9]+)?`, not followed by a
/// word character
fn scan_number(input: &str, start: usize) -> Result<usize, usize> {
    let bytes = input.as_bytes();
    let mut i = start;

    if bytes.get(i) == Some(&b'-') {
        i += 1;
    }
    match bytes.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => i = skip_digits(bytes, i + 1),
        _ => return Err(start),
    }

    if bytes.get(i) == Some(&b'.') && bytes.get(i + 1).map_or(false, u8::is_ascii_digit) {
        i = skip_digits(bytes, i + 1);
    }

    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        if bytes.get(j).map_or(false, u8::is_ascii_digit) {
            i = skip_digits(bytes, j);
        }
    }

    if followed_by_word(input, i) {
        return Err(i);
    }
    Ok(i)
}

/// `[A-Z]+[1-9][0-9]*`, not followed by a word character
fn scan_reference(input: &str, start: usize) -> Result<usize, usize> {
    let bytes = input.as_bytes();
    let mut i = start;

    while bytes.get(i).map_or(false, u8::is_ascii_uppercase) {
        i += 1;
    }
    if i == start || !matches!(bytes.get(i), Some(b'1'..=b'9')) {
        return Err(start);
    }
    i = skip_digits(bytes, i + 1);

    if followed_by_word(input, i) {
        return Err(i);
    }
    Ok(i)
}

/// A double-quoted string on a single line. Returns the unescaped value and
/// the offset after the closing quote.
fn scan_quoted(input: &str, start: usize) -> Result<(String, usize), usize> {
    let Some(body) = input[start..].strip_prefix('"') else {
        return Err(start);
    };
    let body_start = start + 1;

    let mut chars = body.char_indices();
    let mut last_escaped_quote = None;
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((unescape(&body[..i]), body_start + i + 1)),
            '\\' => match chars.next() {
                Some((j, '"')) => last_escaped_quote = Some(j),
                Some((_, next)) if is_line_terminator(next) => break,
                Some(_) => {}
                None => break,
            },
            c if is_line_terminator(c) => break,
            _ => {}
        }
    }

    // Unterminated: an escaped quote may still close the string, with its
    // backslash kept literally.
    match last_escaped_quote {
        Some(j) => Ok((unescape(&body[..j]), body_start + j + 1)),
        None => Err(start),
    }
}

/// Turn escaped characters into real ones (e.g. `\n` becomes a newline).
/// Unknown escapes yield the escaped character; a malformed `\u` is kept
/// as written.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(&next) = chars.peek() else {
            out.push('\\');
            break;
        };

        if next == 'u' {
            let hex: String = chars.clone().skip(1).take(4).collect();
            if hex.len() == 4 && hex.chars().all(|h| h.is_ascii_hexdigit()) {
                let code = u32::from_str_radix(&hex, 16).unwrap_or(0xFFFD);
                out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                for _ in 0..5 {
                    chars.next();
                }
            } else {
                out.push('\\');
            }
            continue;
        }

        chars.next();
        out.push(match next {
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            other => other,
        });
    }

    out
}

/// One or more characters to the end of input, on a single line, not
/// starting with `=`
fn is_raw_string(rest: &str) -> bool {
    !rest.is_empty() && !rest.starts_with('=') && !rest.chars().any(is_line_terminator)
}
