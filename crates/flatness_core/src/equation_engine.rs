use crate::context::DifferentiationContext;
use crate::error::FlatnessError;
use crate::matrix::SymbolicMatrix;
use crate::rational::RationalFunction;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::ToPrimitive;

/// Largest accepted `|n|` in `base ^ n`.
const MAX_EXPONENT: u64 = 64;

// --- AST ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(BigRational),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // -
    Call(String, Box<Expr>),            // parsed so it can be rejected with a clear message
}

/// Lowers an AST (`Expr`) to an exact rational function.
/// Identifiers are resolved against the state vector, its derivatives and
/// the declared parameters.
pub struct Compiler<'a> {
    pub context: &'a DifferentiationContext,
}

impl<'a> Compiler<'a> {
    pub fn new(context: &'a DifferentiationContext) -> Self {
        Self { context }
    }

    pub fn compile(&self, expr: &Expr) -> Result<RationalFunction, String> {
        match expr {
            Expr::Number(n) => Ok(RationalFunction::constant(n.clone())),
            Expr::Variable(name) => self
                .context
                .resolve(name)
                .map(RationalFunction::from_symbol)
                .ok_or_else(|| format!("Unknown variable or parameter: {}", name)),
            Expr::Binary(left, op, right) => {
                let l = self.compile(left)?;
                let r = self.compile(right)?;
                match op {
                    '+' => Ok(&l + &r),
                    '-' => Ok(&l - &r),
                    '*' => Ok(&l * &r),
                    '/' => l
                        .checked_div(&r.simplify())
                        .ok_or_else(|| "Division by zero".to_string()),
                    '^' => {
                        let exponent = r
                            .simplify()
                            .constant_value()
                            .filter(|c| c.is_integer())
                            .and_then(|c| c.to_integer().to_i64())
                            .ok_or_else(|| "Exponents must be integer constants".to_string())?;
                        if exponent.unsigned_abs() > MAX_EXPONENT {
                            return Err(format!(
                                "Exponent {} exceeds the limit of {}",
                                exponent, MAX_EXPONENT
                            ));
                        }
                        l.pow(exponent)
                            .ok_or_else(|| "Zero raised to a negative power".to_string())
                    }
                    _ => Err(format!("Unknown binary operator: {}", op)),
                }
            }
            Expr::Unary(op, operand) => {
                let v = self.compile(operand)?;
                match op {
                    '-' => Ok(-&v),
                    _ => Err(format!("Unknown unary operator: {}", op)),
                }
            }
            Expr::Call(func, _) => Err(format!(
                "Function calls are not supported (only rational expressions): {}",
                func
            )),
        }
    }
}

/// Parses and lowers a single expression, simplified.
pub fn parse_expression(
    input: &str,
    context: &DifferentiationContext,
) -> Result<RationalFunction, FlatnessError> {
    let expr = parse(input).map_err(|e| parse_error(input, e))?;
    let value = Compiler::new(context)
        .compile(&expr)
        .map_err(|e| parse_error(input, e))?;
    Ok(value.simplify())
}

/// Parses a matrix literal `[[a, b], [c, d]]`; `[]` is the empty matrix.
pub fn parse_matrix(
    input: &str,
    context: &DifferentiationContext,
) -> Result<SymbolicMatrix, FlatnessError> {
    let tokens = tokenize(input).map_err(|e| parse_error(input, e))?;
    let mut parser = Parser { tokens, pos: 0 };
    let rows = parser
        .parse_matrix_literal()
        .and_then(|rows| parser.expect_end().map(|_| rows))
        .map_err(|e| parse_error(input, e))?;

    let compiler = Compiler::new(context);
    let rows = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|e| compiler.compile(e).map(|v| v.simplify()))
                .collect::<Result<Vec<_>, String>>()
        })
        .collect::<Result<Vec<_>, String>>()
        .map_err(|e| parse_error(input, e))?;
    SymbolicMatrix::from_rows(rows)
}

fn parse_error(input: &str, message: String) -> FlatnessError {
    FlatnessError::Parse(format!("{} in \"{}\"", message, input))
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(BigRational),
    Identifier(String),
    Plus, Minus, Star, Slash, Caret,
    LParen, RParen,
    LBracket, RBracket, Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Number(parse_decimal(&num_str)?));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            chars.next();
            match c {
                '+' => tokens.push(Token::Plus),
                '-' => tokens.push(Token::Minus),
                '*' => {
                    if let Some('*') = chars.peek() {
                        chars.next();
                        tokens.push(Token::Caret);
                    } else {
                        tokens.push(Token::Star);
                    }
                }
                '/' => tokens.push(Token::Slash),
                '^' => tokens.push(Token::Caret),
                '(' => tokens.push(Token::LParen),
                ')' => tokens.push(Token::RParen),
                '[' => tokens.push(Token::LBracket),
                ']' => tokens.push(Token::RBracket),
                ',' => tokens.push(Token::Comma),
                _ => return Err(format!("Unexpected character '{}'", c)),
            }
        }
    }
    Ok(tokens)
}

/// Exact value of a decimal literal such as `12`, `0.25` or `.5`.
fn parse_decimal(text: &str) -> Result<BigRational, String> {
    let invalid = || format!("Invalid number literal '{}'", text);
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    if frac_part.contains('.') || (int_part.is_empty() && frac_part.is_empty()) {
        return Err(invalid());
    }
    let digits = format!("{}{}", int_part, frac_part);
    let numer: BigInt = digits.parse().map_err(|_| invalid())?;
    let denom = num_traits::pow(BigInt::from(10), frac_part.len());
    Ok(BigRational::new(numer, denom))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).cloned()
    }

    fn consume(&mut self) -> Option<Token> {
        if self.pos < self.tokens.len() {
            let t = self.tokens[self.pos].clone();
            self.pos += 1;
            Some(t)
        } else {
            None
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), String> {
        match self.consume() {
            Some(t) if t == expected => Ok(()),
            _ => Err(format!("Expected {}", what)),
        }
    }

    fn expect_end(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!("Unexpected trailing token {:?}", t)),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, String> {
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_factor_op()?;

        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.consume();
                    let right = self.parse_factor_op()?;
                    left = Expr::Binary(Box::new(left), '+', Box::new(right));
                }
                Token::Minus => {
                    self.consume();
                    let right = self.parse_factor_op()?;
                    left = Expr::Binary(Box::new(left), '-', Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_factor_op(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.consume();
                    let right = self.parse_unary()?;
                    left = Expr::Binary(Box::new(left), '*', Box::new(right));
                }
                Token::Slash => {
                    self.consume();
                    let right = self.parse_unary()?;
                    left = Expr::Binary(Box::new(left), '/', Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // Unary minus binds looser than '^': -x^2 is -(x^2).
    fn parse_unary(&mut self) -> Result<Expr, String> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary('-', Box::new(expr)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_primary()?;

        while let Some(Token::Caret) = self.peek() {
            self.consume();
            // Allows x^-1.
            let right = if let Some(Token::Minus) = self.peek() {
                self.consume();
                Expr::Unary('-', Box::new(self.parse_primary()?))
            } else {
                self.parse_primary()?
            };
            left = Expr::Binary(Box::new(left), '^', Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let arg = self.parse_expression()?;
                    self.expect(Token::RParen, "')'")?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(t) => Err(format!("Unexpected token {:?}", t)),
            None => Err("Unexpected end of input".to_string()),
        }
    }

    fn parse_matrix_literal(&mut self) -> Result<Vec<Vec<Expr>>, String> {
        self.expect(Token::LBracket, "'['")?;
        let mut rows = Vec::new();
        if let Some(Token::RBracket) = self.peek() {
            self.consume();
            return Ok(rows);
        }
        loop {
            rows.push(self.parse_row()?);
            match self.consume() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                _ => return Err("Expected ',' or ']' after a matrix row".to_string()),
            }
        }
        Ok(rows)
    }

    fn parse_row(&mut self) -> Result<Vec<Expr>, String> {
        self.expect(Token::LBracket, "'[' at the start of a matrix row")?;
        let mut row = Vec::new();
        if let Some(Token::RBracket) = self.peek() {
            self.consume();
            return Ok(row);
        }
        loop {
            row.push(self.parse_expression()?);
            match self.consume() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                _ => return Err("Expected ',' or ']' inside a matrix row".to_string()),
            }
        }
        Ok(row)
    }
}
