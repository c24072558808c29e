//! Formula parser
//!
//! A recursive descent parser over the token stream with spreadsheet
//! operator precedence.

use crate::ast::{BinaryOperator, FormulaExpr, NameReference, RangeReference, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::tokenizer::{tokenize, Token, TokenKind};
use gridcalc_core::CellRange;

/// Default limit on nested parentheses, calls, arrays and prefix operators
pub const DEFAULT_MAX_PARSE_DEPTH: usize = 64;

/// Default limit on expression tree height, operator chains included
pub const DEFAULT_MAX_PARSE_HEIGHT: usize = 256;

/// Parser limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Deepest nesting accepted before the parse fails
    pub max_depth: usize,
    /// Tallest expression tree accepted; `1+1+1` is two levels
    pub max_height: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_PARSE_DEPTH,
            max_height: DEFAULT_MAX_PARSE_HEIGHT,
        }
    }
}

/// Parse a formula string into an AST
///
/// The leading `=` is optional.
///
/// # Example
/// ```rust
/// use gridcalc_formula::parse_formula;
///
/// let ast = parse_formula("=1+2").unwrap();
/// let ast = parse_formula("=SUM(A1:A10)").unwrap();
/// let ast = parse_formula("IF(A1>0,\"Yes\",\"No\")").unwrap();
/// ```
pub fn parse_formula(formula: &str) -> FormulaResult<FormulaExpr> {
    parse_formula_with_options(formula, &ParseOptions::default())
}

/// Parse a formula string with explicit limits
pub fn parse_formula_with_options(
    formula: &str,
    options: &ParseOptions,
) -> FormulaResult<FormulaExpr> {
    let tokens = tokenize(formula)?;
    FormulaParser::new(&tokens, formula.len(), options).parse_all()
}

/// Parse an already tokenized formula
pub fn parse(tokens: &[Token]) -> FormulaResult<FormulaExpr> {
    let end = tokens.last().map_or(0, |t| t.position + t.text.len());
    FormulaParser::new(tokens, end, &ParseOptions::default()).parse_all()
}

struct FormulaParser<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// Byte offset reported for errors at end of input
    end: usize,
    depth: usize,
    max_depth: usize,
    height: usize,
    max_height: usize,
}

impl<'t> FormulaParser<'t> {
    fn new(tokens: &'t [Token], end: usize, options: &ParseOptions) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
            depth: 0,
            max_depth: options.max_depth,
            height: 0,
            max_height: options.max_height,
        }
    }

    fn parse_all(mut self) -> FormulaResult<FormulaExpr> {
        if self.tokens.is_empty() {
            return Err(FormulaError::parse(self.end, "empty formula"));
        }

        let expr = self.nested(Self::parse_expression)?;

        // Make sure we consumed all input
        if let Some(token) = self.current() {
            return Err(FormulaError::parse(
                token.position,
                format!("unexpected '{}' after end of expression", token.text),
            ));
        }
        Ok(expr)
    }

    // === Token access ===

    fn current(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn current_kind(&self) -> Option<&'t TokenKind> {
        self.current().map(|t| &t.kind)
    }

    fn position(&self) -> usize {
        self.current().map_or(self.end, |t| t.position)
    }

    fn consume(&mut self) -> Option<&'t Token> {
        let token = self.current();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: TokenKind, what: &str) -> FormulaResult<()> {
        match self.current() {
            Some(token) if token.kind == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(FormulaError::parse(
                token.position,
                format!("expected {}, found '{}'", what, token.text),
            )),
            None => Err(FormulaError::parse(
                self.end,
                format!("expected {}, found end of formula", what),
            )),
        }
    }

    /// Run `f` one nesting level deeper
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> FormulaResult<T>) -> FormulaResult<T> {
        if self.depth >= self.max_depth {
            return Err(FormulaError::parse(
                self.position(),
                format!("formula nesting too deep (limit {})", self.max_depth),
            ));
        }
        let base = self.height;
        self.grow()?;
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        self.height = base;
        result
    }

    /// Add one level to the expression tree being built
    fn grow(&mut self) -> FormulaResult<()> {
        if self.height >= self.max_height {
            return Err(FormulaError::parse(
                self.position(),
                format!("expression too deep (limit {} levels)", self.max_height),
            ));
        }
        self.height += 1;
        Ok(())
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Comparison: =, <>, <, <=, >, >=
    // 2. Concatenation: &
    // 3. Addition/Subtraction: +, -
    // 4. Multiplication/Division: *, /
    // 5. Exponentiation: ^ (left associative)
    // 6. Prefix: -, +
    // 7. Postfix: %
    // 8. Range: :
    // 9. Primary: literals, references, function calls, parentheses, arrays

    fn parse_expression(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_binary_level(Self::parse_concatenation, |kind| match kind {
            TokenKind::Equal => Some(BinaryOperator::Equal),
            TokenKind::NotEqual => Some(BinaryOperator::NotEqual),
            TokenKind::LessThan => Some(BinaryOperator::LessThan),
            TokenKind::LessEqual => Some(BinaryOperator::LessEqual),
            TokenKind::GreaterThan => Some(BinaryOperator::GreaterThan),
            TokenKind::GreaterEqual => Some(BinaryOperator::GreaterEqual),
            _ => None,
        })
    }

    fn parse_concatenation(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_binary_level(Self::parse_additive, |kind| match kind {
            TokenKind::Ampersand => Some(BinaryOperator::Concat),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_binary_level(Self::parse_multiplicative, |kind| match kind {
            TokenKind::Plus => Some(BinaryOperator::Add),
            TokenKind::Minus => Some(BinaryOperator::Subtract),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_binary_level(Self::parse_exponent, |kind| match kind {
            TokenKind::Star => Some(BinaryOperator::Multiply),
            TokenKind::Slash => Some(BinaryOperator::Divide),
            _ => None,
        })
    }

    /// 2^3^2 is (2^3)^2
    fn parse_exponent(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_binary_level(Self::parse_unary, |kind| match kind {
            TokenKind::Caret => Some(BinaryOperator::Power),
            _ => None,
        })
    }

    /// One left-associative precedence level
    ///
    /// Each operator in the chain adds a level to the tree, so it counts
    /// against the height limit.
    fn parse_binary_level(
        &mut self,
        operand: fn(&mut Self) -> FormulaResult<FormulaExpr>,
        operator: fn(&TokenKind) -> Option<BinaryOperator>,
    ) -> FormulaResult<FormulaExpr> {
        let base = self.height;
        let mut left = operand(self)?;

        while let Some(op) = self.current_kind().and_then(operator) {
            self.grow()?;
            self.consume();
            let right = operand(self)?;
            left = binary(op, left, right);
        }

        self.height = base;
        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<FormulaExpr> {
        let op = match self.current_kind() {
            Some(TokenKind::Minus) => Some(UnaryOperator::Negate),
            Some(TokenKind::Plus) => Some(UnaryOperator::Plus),
            _ => None,
        };

        if let Some(op) = op {
            self.consume();
            let operand = self.nested(Self::parse_unary)?;
            return Ok(FormulaExpr::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }

        // Parse range, then check for postfix percent
        let base = self.height;
        let mut expr = self.parse_range()?;

        while matches!(self.current_kind(), Some(TokenKind::Percent)) {
            self.grow()?;
            self.consume();
            expr = FormulaExpr::UnaryOp {
                op: UnaryOperator::Percent,
                operand: Box::new(expr),
            };
        }

        self.height = base;
        Ok(expr)
    }

    fn parse_range(&mut self) -> FormulaResult<FormulaExpr> {
        let left = self.parse_primary()?;

        if !matches!(self.current_kind(), Some(TokenKind::Colon)) {
            return Ok(left);
        }
        self.consume();
        let right = self.parse_primary()?;

        // Two references on the same sheet collapse into one range
        if let (FormulaExpr::CellRef(start), FormulaExpr::CellRef(end)) = (&left, &right) {
            let same_sheet = match (&start.sheet, &end.sheet) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same_sheets(b),
                _ => false,
            };
            if same_sheet {
                return Ok(FormulaExpr::RangeRef(RangeReference {
                    sheet: start.sheet.clone(),
                    range: CellRange::new(start.address, end.address),
                }));
            }
        }

        Ok(binary(BinaryOperator::Range, left, right))
    }

    fn parse_primary(&mut self) -> FormulaResult<FormulaExpr> {
        let Some(token) = self.current() else {
            return Err(FormulaError::parse(self.end, "unexpected end of formula"));
        };

        let expr = match &token.kind {
            TokenKind::Number(n) => FormulaExpr::Number(*n),
            TokenKind::String(s) => FormulaExpr::String(s.clone()),
            TokenKind::Boolean(b) => FormulaExpr::Boolean(*b),
            TokenKind::Error(e) => FormulaExpr::Error(*e),
            TokenKind::CellRef(r) => FormulaExpr::CellRef(r.clone()),
            TokenKind::RangeRef(r) => FormulaExpr::RangeRef(r.clone()),
            TokenKind::Identifier(name) => FormulaExpr::NameRef(NameReference::new(name.as_str())),
            TokenKind::QualifiedName(r) => FormulaExpr::NameRef(r.clone()),

            TokenKind::LeftParen => {
                self.consume();
                let inner = self.nested(Self::parse_expression)?;
                self.expect(TokenKind::RightParen, "')'")?;
                return Ok(FormulaExpr::Paren(Box::new(inner)));
            }

            TokenKind::LeftBrace => return self.nested(Self::parse_array),

            TokenKind::Function(name) => {
                self.consume();
                return self.nested(|p| p.parse_function_call(name.clone()));
            }

            _ => {
                return Err(FormulaError::parse(
                    token.position,
                    format!("unexpected '{}'", token.text),
                ))
            }
        };

        self.consume();
        Ok(expr)
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<FormulaExpr> {
        self.expect(TokenKind::LeftParen, "'('")?;

        let mut args = Vec::new();

        if matches!(self.current_kind(), Some(TokenKind::RightParen)) {
            self.consume();
            return Ok(FormulaExpr::Function { name, args });
        }

        loop {
            if matches!(
                self.current_kind(),
                Some(TokenKind::Comma | TokenKind::RightParen)
            ) {
                return Err(FormulaError::parse(
                    self.position(),
                    format!("missing argument in call to {}", name),
                ));
            }
            args.push(self.parse_expression()?);

            match self.current() {
                Some(t) if t.kind == TokenKind::Comma => {
                    self.consume();
                }
                Some(t) if t.kind == TokenKind::RightParen => {
                    self.consume();
                    break;
                }
                Some(t) => {
                    return Err(FormulaError::parse(
                        t.position,
                        format!("expected ',' or ')', found '{}'", t.text),
                    ))
                }
                None => {
                    return Err(FormulaError::parse(
                        self.end,
                        format!("unclosed call to {}", name),
                    ))
                }
            }
        }

        Ok(FormulaExpr::Function { name, args })
    }

    fn parse_array(&mut self) -> FormulaResult<FormulaExpr> {
        let open = self.position();
        self.expect(TokenKind::LeftBrace, "'{'")?;

        if matches!(self.current_kind(), Some(TokenKind::RightBrace)) {
            return Err(FormulaError::parse(open, "empty array constant"));
        }

        let mut rows = Vec::new();
        let mut current_row = vec![self.parse_array_element()?];

        loop {
            match self.current_kind() {
                Some(TokenKind::Comma) => {
                    self.consume();
                    current_row.push(self.parse_array_element()?);
                }
                Some(TokenKind::Semicolon) => {
                    self.consume();
                    rows.push(std::mem::take(&mut current_row));
                    current_row.push(self.parse_array_element()?);
                }
                Some(TokenKind::RightBrace) => {
                    self.consume();
                    break;
                }
                _ => {
                    return Err(FormulaError::parse(
                        self.position(),
                        "expected ',', ';' or '}' in array constant",
                    ))
                }
            }
        }
        rows.push(current_row);

        let width = rows[0].len();
        if rows.iter().any(|row| row.len() != width) {
            return Err(FormulaError::parse(
                open,
                "array constant rows must have the same number of columns",
            ));
        }

        Ok(FormulaExpr::Array(rows))
    }

    /// Array constants hold literals only; `-` is allowed before a number
    fn parse_array_element(&mut self) -> FormulaResult<FormulaExpr> {
        let position = self.position();
        let negative = matches!(self.current_kind(), Some(TokenKind::Minus));
        if negative {
            self.consume();
        }

        let element = match self.current_kind() {
            Some(TokenKind::Number(n)) if negative => FormulaExpr::Number(-n),
            Some(TokenKind::Number(n)) => FormulaExpr::Number(*n),
            Some(TokenKind::String(s)) if !negative => FormulaExpr::String(s.clone()),
            Some(TokenKind::Boolean(b)) if !negative => FormulaExpr::Boolean(*b),
            Some(TokenKind::Error(e)) if !negative => FormulaExpr::Error(*e),
            _ => {
                return Err(FormulaError::parse(
                    position,
                    "array constants may only contain numbers, text, booleans or errors",
                ))
            }
        };

        self.consume();
        Ok(element)
    }
}

fn binary(op: BinaryOperator, left: FormulaExpr, right: FormulaExpr) -> FormulaExpr {
    FormulaExpr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CellReference, SheetRef};
    use gridcalc_core::{CellAddress, CellError};
    use pretty_assertions::assert_eq;

    fn num(n: f64) -> FormulaExpr {
        FormulaExpr::Number(n)
    }

    fn cell(a1: &str) -> FormulaExpr {
        FormulaExpr::CellRef(CellReference {
            sheet: None,
            address: CellAddress::parse(a1).unwrap(),
        })
    }

    fn parse_error(text: &str) -> crate::error::ParseError {
        match parse_formula(text) {
            Err(FormulaError::Parse(e)) => e,
            other => panic!("expected parse error for {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_formula("=42").unwrap(), num(42.0));
        assert_eq!(parse_formula("=1e10").unwrap(), num(1e10));
        assert_eq!(
            parse_formula("=\"Hello \"\"World\"\"\"").unwrap(),
            FormulaExpr::String("Hello \"World\"".into())
        );
        assert_eq!(parse_formula("=FALSE").unwrap(), FormulaExpr::Boolean(false));
        assert_eq!(
            parse_formula("=#DIV/0!").unwrap(),
            FormulaExpr::Error(CellError::Div0)
        );
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(
            parse_formula("=1+2*3").unwrap(),
            binary(
                BinaryOperator::Add,
                num(1.0),
                binary(BinaryOperator::Multiply, num(2.0), num(3.0))
            )
        );
        assert_eq!(
            parse_formula("=1-2-3").unwrap(),
            binary(
                BinaryOperator::Subtract,
                binary(BinaryOperator::Subtract, num(1.0), num(2.0)),
                num(3.0)
            )
        );
    }

    #[test]
    fn test_power_is_left_associative_and_below_negation() {
        assert_eq!(
            parse_formula("=2^3^2").unwrap(),
            binary(
                BinaryOperator::Power,
                binary(BinaryOperator::Power, num(2.0), num(3.0)),
                num(2.0)
            )
        );
        // -2^2 is (-2)^2
        assert_eq!(
            parse_formula("=-2^2").unwrap(),
            binary(
                BinaryOperator::Power,
                FormulaExpr::UnaryOp {
                    op: UnaryOperator::Negate,
                    operand: Box::new(num(2.0)),
                },
                num(2.0)
            )
        );
    }

    #[test]
    fn test_comparison_binds_loosest() {
        assert_eq!(
            parse_formula("=A1&\"x\"=\"1x\"").unwrap(),
            binary(
                BinaryOperator::Equal,
                binary(
                    BinaryOperator::Concat,
                    cell("A1"),
                    FormulaExpr::String("x".into())
                ),
                FormulaExpr::String("1x".into())
            )
        );
    }

    #[test]
    fn test_unary_and_percent() {
        assert_eq!(
            parse_formula("=+-A1%").unwrap(),
            FormulaExpr::UnaryOp {
                op: UnaryOperator::Plus,
                operand: Box::new(FormulaExpr::UnaryOp {
                    op: UnaryOperator::Negate,
                    operand: Box::new(FormulaExpr::UnaryOp {
                        op: UnaryOperator::Percent,
                        operand: Box::new(cell("A1")),
                    }),
                }),
            }
        );
    }

    #[test]
    fn test_parens_are_kept() {
        assert_eq!(
            parse_formula("=(1+2)*3").unwrap(),
            binary(
                BinaryOperator::Multiply,
                FormulaExpr::Paren(Box::new(binary(BinaryOperator::Add, num(1.0), num(2.0)))),
                num(3.0)
            )
        );
    }

    #[test]
    fn test_range_operator() {
        // Spaces around ':' still produce a range of two cells
        assert_eq!(
            parse_formula("=A1 : B2").unwrap(),
            FormulaExpr::RangeRef(RangeReference {
                sheet: None,
                range: CellRange::parse("A1:B2").unwrap(),
            })
        );
        // Different sheets stay a range operation for the resolver to judge
        let expr = parse_formula("=Sheet1!A1:Sheet2!B2").unwrap();
        assert!(matches!(
            expr,
            FormulaExpr::BinaryOp {
                op: BinaryOperator::Range,
                ..
            }
        ));
        let expr = parse_formula("=Data!A1:data!B2").unwrap();
        assert_eq!(
            expr,
            FormulaExpr::RangeRef(RangeReference {
                sheet: Some(SheetRef::Single("Data".into())),
                range: CellRange::parse("A1:B2").unwrap(),
            })
        );
    }

    #[test]
    fn test_parse_function_calls() {
        assert_eq!(
            parse_formula("=sum(A1, Rate, pi())").unwrap(),
            FormulaExpr::Function {
                name: "SUM".into(),
                args: vec![
                    cell("A1"),
                    FormulaExpr::NameRef(NameReference::new("Rate")),
                    FormulaExpr::Function {
                        name: "PI".into(),
                        args: vec![],
                    },
                ],
            }
        );
    }

    #[test]
    fn test_parse_array() {
        assert_eq!(
            parse_formula("={1,-2;\"a\",TRUE}").unwrap(),
            FormulaExpr::Array(vec![
                vec![num(1.0), num(-2.0)],
                vec![FormulaExpr::String("a".into()), FormulaExpr::Boolean(true)],
            ])
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_error("=").position, 1);
        assert!(parse_error("=").message.contains("empty formula"));
        assert_eq!(parse_error("=1+").position, 3);
        assert_eq!(parse_error("=(1+2").message, "expected ')', found end of formula");
        assert_eq!(parse_error("=1 2").position, 3);
        assert!(parse_error("=SUM(1,)").message.contains("missing argument"));
        assert!(parse_error("=SUM(,1)").message.contains("missing argument"));
        assert!(parse_error("={1,2;3}").message.contains("same number of columns"));
        assert!(parse_error("={A1}").message.contains("array constants"));
        assert!(parse_error("={}").message.contains("empty array"));
        assert_eq!(parse_error("=)").position, 1);
    }

    #[test]
    fn test_nesting_limit() {
        let deep = |n: usize| format!("={}1{}", "(".repeat(n), ")".repeat(n));
        assert!(parse_formula(&deep(DEFAULT_MAX_PARSE_DEPTH - 1)).is_ok());
        assert!(parse_error(&deep(DEFAULT_MAX_PARSE_DEPTH)).message.contains("nesting too deep"));

        let options = ParseOptions {
            max_depth: 3,
            ..ParseOptions::default()
        };
        assert!(parse_formula_with_options("=ABS(ABS(1))", &options).is_ok());
        assert!(parse_formula_with_options("=ABS(ABS(ABS(1)))", &options).is_err());
        assert!(parse_formula_with_options("=---1", &options).is_err());
        assert!(parse_formula(&format!("={}1", "-".repeat(1000))).is_err());
    }

    #[test]
    fn test_operator_chain_limit() {
        let chain = |op: &str, n: usize| format!("=1{}", format!("{}1", op).repeat(n));
        assert!(parse_formula(&chain("+", DEFAULT_MAX_PARSE_HEIGHT - 2)).is_ok());

        for op in ["+", "&", "*", "^", "<"] {
            let error = parse_error(&chain(op, 4000));
            assert!(error.message.contains("expression too deep"), "{}", op);
        }
        assert!(parse_error(&format!("=1{}", "%".repeat(4000)))
            .message
            .contains("expression too deep"));

        let options = ParseOptions {
            max_height: 4,
            ..ParseOptions::default()
        };
        assert!(parse_formula_with_options("=1+2+3", &options).is_ok());
        assert!(parse_formula_with_options("=1+2+3+4+5", &options).is_err());
    }

    #[test]
    fn test_parse_tokens_directly() {
        let tokens = tokenize("1+A1").unwrap();
        assert_eq!(
            parse(&tokens).unwrap(),
            binary(BinaryOperator::Add, num(1.0), cell("A1"))
        );
        assert!(parse(&[]).is_err());
    }
}
