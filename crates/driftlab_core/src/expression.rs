use crate::double_double::ExtFloat;
use crate::traits::{Scalar, VectorField};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown variable or parameter '{0}'")]
    UnknownIdentifier(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("name '{0}' is declared more than once or is reserved")]
    DuplicateName(String),
    #[error("expected {expected} equations (one per variable), got {found}")]
    EquationCount { expected: usize, found: usize },
    #[error("expected {expected} parameter values, got {found}")]
    ParameterCount { expected: usize, found: usize },
    #[error("in equation for '{name}': {source}")]
    InEquation {
        name: String,
        #[source]
        source: Box<ExpressionError>,
    },
}

/// OpCodes for the stack machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a literal from the constant table.
    LoadConst(usize),
    /// Pushes a state variable by index.
    LoadVar(usize),
    /// Pushes a parameter by index.
    LoadParam(usize),
    /// Pushes the current time.
    LoadTime,
    Add,
    Sub,
    Mul,
    Div,
    /// Real power `a ^ b`.
    Pow,
    /// Power with a literal integer exponent.
    PowI(i32),
    Neg,
    Sin,
    Cos,
    Exp,
    Ln,
    Sqrt,
}

/// A compiled expression: instructions plus the literals they reference.
///
/// Literals are kept in extended precision and converted to the working type
/// when the expression runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
    pub constants: Vec<ExtFloat>,
    max_depth: usize,
}

/// Runtime values available to an expression.
pub struct Frame<'a, T> {
    pub t: T,
    pub vars: &'a [T],
    pub params: &'a [T],
}

/// Stack-based virtual machine.
pub struct VM;

impl VM {
    /// Executes `bytecode` against `frame`, reusing `stack` as scratch space.
    pub fn execute<T: Scalar>(bytecode: &Bytecode, frame: &Frame<'_, T>, stack: &mut Vec<T>) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(idx) => stack.push(T::from_extended(bytecode.constants[idx])),
                OpCode::LoadVar(idx) => stack.push(frame.vars[idx]),
                OpCode::LoadParam(idx) => stack.push(frame.params[idx]),
                OpCode::LoadTime => stack.push(frame.t),
                OpCode::Add => binary(stack, |a, b| a + b),
                OpCode::Sub => binary(stack, |a, b| a - b),
                OpCode::Mul => binary(stack, |a, b| a * b),
                OpCode::Div => binary(stack, |a, b| a / b),
                OpCode::Pow => binary(stack, |a, b| a.powf(b)),
                OpCode::PowI(n) => unary(stack, |a| a.powi(n)),
                OpCode::Neg => unary(stack, |a| -a),
                OpCode::Sin => unary(stack, |a| a.sin()),
                OpCode::Cos => unary(stack, |a| a.cos()),
                OpCode::Exp => unary(stack, |a| a.exp()),
                OpCode::Ln => unary(stack, |a| a.ln()),
                OpCode::Sqrt => unary(stack, |a| a.sqrt()),
            }
        }

        // Compiled bytecode always leaves exactly one value.
        stack.pop().unwrap_or_else(T::nan)
    }
}

fn unary<T: Scalar>(stack: &mut [T], op: impl Fn(T) -> T) {
    if let Some(top) = stack.last_mut() {
        *top = op(*top);
    }
}

fn binary<T: Scalar>(stack: &mut Vec<T>, op: impl Fn(T, T) -> T) {
    let b = stack.pop().unwrap_or_else(T::nan);
    if let Some(a) = stack.last_mut() {
        *a = op(*a, b);
    }
}

// --- AST & Parser ---

/// Abstract syntax tree of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(ExtFloat),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>),
    Neg(Box<Expr>),
    Call(String, Box<Expr>),
}

const FUNCTIONS: [&str; 5] = ["sin", "cos", "exp", "ln", "sqrt"];
const TIME: &str = "t";

/// Resolves names to slots and lowers an [`Expr`] to [`Bytecode`].
pub struct Compiler {
    var_map: HashMap<String, usize>,
    param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Result<Self, ExpressionError> {
        let mut var_map = HashMap::new();
        let mut param_map = HashMap::new();
        for (i, name) in var_names.iter().enumerate() {
            if Self::reserved(name) || var_map.insert(name.clone(), i).is_some() {
                return Err(ExpressionError::DuplicateName(name.clone()));
            }
        }
        for (i, name) in param_names.iter().enumerate() {
            if Self::reserved(name)
                || var_map.contains_key(name)
                || param_map.insert(name.clone(), i).is_some()
            {
                return Err(ExpressionError::DuplicateName(name.clone()));
            }
        }
        Ok(Self { var_map, param_map })
    }

    fn reserved(name: &str) -> bool {
        name == TIME || FUNCTIONS.contains(&name)
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, ExpressionError> {
        let mut code = Bytecode {
            ops: Vec::new(),
            constants: Vec::new(),
            max_depth: 0,
        };
        let mut depth = 0;
        self.compile_recursive(expr, &mut code, &mut depth)?;
        Ok(code)
    }

    fn push(code: &mut Bytecode, depth: &mut usize, op: OpCode) {
        match op {
            OpCode::LoadConst(_) | OpCode::LoadVar(_) | OpCode::LoadParam(_) | OpCode::LoadTime => {
                *depth += 1;
                code.max_depth = code.max_depth.max(*depth);
            }
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => *depth -= 1,
            _ => {}
        }
        code.ops.push(op);
    }

    fn compile_recursive(
        &self,
        expr: &Expr,
        code: &mut Bytecode,
        depth: &mut usize,
    ) -> Result<(), ExpressionError> {
        match expr {
            Expr::Number(n) => {
                code.constants.push(*n);
                let idx = code.constants.len() - 1;
                Self::push(code, depth, OpCode::LoadConst(idx));
            }
            Expr::Variable(name) => {
                let op = if name == TIME {
                    OpCode::LoadTime
                } else if let Some(&idx) = self.var_map.get(name) {
                    OpCode::LoadVar(idx)
                } else if let Some(&idx) = self.param_map.get(name) {
                    OpCode::LoadParam(idx)
                } else {
                    return Err(ExpressionError::UnknownIdentifier(name.clone()));
                };
                Self::push(code, depth, op);
            }
            Expr::Binary(left, '^', right) => {
                self.compile_recursive(left, code, depth)?;
                match integer_exponent(right) {
                    Some(n) => Self::push(code, depth, OpCode::PowI(n)),
                    None => {
                        self.compile_recursive(right, code, depth)?;
                        Self::push(code, depth, OpCode::Pow);
                    }
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, code, depth)?;
                self.compile_recursive(right, code, depth)?;
                let op = match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    _ => OpCode::Div,
                };
                Self::push(code, depth, op);
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, code, depth)?;
                Self::push(code, depth, OpCode::Neg);
            }
            Expr::Call(func, arg) => {
                let op = match func.as_str() {
                    "sin" => OpCode::Sin,
                    "cos" => OpCode::Cos,
                    "exp" => OpCode::Exp,
                    "ln" => OpCode::Ln,
                    "sqrt" => OpCode::Sqrt,
                    _ => return Err(ExpressionError::UnknownFunction(func.clone())),
                };
                self.compile_recursive(arg, code, depth)?;
                Self::push(code, depth, op);
            }
        }
        Ok(())
    }
}

/// Literal integer exponents (`x^2`, `x^-1`) compile to repeated multiplication.
fn integer_exponent(expr: &Expr) -> Option<i32> {
    let (value, negate) = match expr {
        Expr::Number(n) => (*n, false),
        Expr::Neg(inner) => match inner.as_ref() {
            Expr::Number(n) => (*n, true),
            _ => return None,
        },
        _ => return None,
    };
    let hi = value.hi;
    if value.lo != 0.0 || hi.fract() != 0.0 || hi.abs() > 64.0 {
        return None;
    }
    let n = hi as i32;
    Some(if negate { -n } else { n })
}

// --- Parser ---

/// Parses an expression into an AST.
///
/// Grammar, loosest first: `+ -`, `* /`, unary minus, right-associative `^`,
/// then numbers, names, calls and parentheses.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some((token, position)) => Err(ExpressionError::UnexpectedToken {
            found: token.describe(),
            position: *position,
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(ExtFloat),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n.to_f64_lossy()),
            Token::Identifier(name) => format!("identifier '{name}'"),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Star => "'*'".into(),
            Token::Slash => "'/'".into(),
            Token::Caret => "'^'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    literal.push(d);
                    chars.next();
                } else if (d == 'e' || d == 'E') && !literal.contains(['e', 'E']) {
                    literal.push(d);
                    chars.next();
                    if let Some(&(_, sign)) = chars.peek() {
                        if sign == '+' || sign == '-' {
                            literal.push(sign);
                            chars.next();
                        }
                    }
                } else {
                    break;
                }
            }
            let value = ExtFloat::from_decimal(&literal)
                .ok_or_else(|| ExpressionError::InvalidNumber(literal.clone()))?;
            tokens.push((Token::Number(value), position));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push((Token::Identifier(ident), position));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(ExpressionError::UnexpectedCharacter { ch: c, position }),
            };
            tokens.push((token, position));
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn consume(&mut self) -> Option<(Token, usize)> {
        let next = self.tokens.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn expect_close(&mut self) -> Result<(), ExpressionError> {
        match self.consume() {
            Some((Token::RParen, _)) => Ok(()),
            Some((token, position)) => Err(ExpressionError::UnexpectedToken {
                found: token.describe(),
                position,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_product()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some('+'),
            Some(Token::Minus) => Some('-'),
            _ => None,
        } {
            self.consume();
            let right = self.parse_product()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some('*'),
            Some(Token::Slash) => Some('/'),
            _ => None,
        } {
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(expr)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.consume() {
            Some((Token::Number(n), _)) => Ok(Expr::Number(n)),
            Some((Token::Identifier(name), _)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    self.expect_close()?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some((Token::LParen, _)) => {
                let expr = self.parse_expression()?;
                self.expect_close()?;
                Ok(expr)
            }
            Some((token, position)) => Err(ExpressionError::UnexpectedToken {
                found: token.describe(),
                position,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

// --- ExpressionField ---

/// A vector field given by one compiled expression per state variable.
///
/// Works in every precision: literals and parameters are stored in extended
/// precision and narrowed on evaluation. Each call uses its own scratch stack,
/// so a field can be shared across threads.
#[derive(Debug, Clone)]
pub struct ExpressionField {
    var_names: Vec<String>,
    param_names: Vec<String>,
    params: Vec<ExtFloat>,
    equations: Vec<Bytecode>,
}

impl ExpressionField {
    /// Compiles `equations[i]` as the right-hand side of `var_names[i]'`.
    pub fn new(
        var_names: &[&str],
        equations: &[&str],
        param_names: &[&str],
        param_values: &[f64],
    ) -> Result<Self, ExpressionError> {
        if equations.len() != var_names.len() {
            return Err(ExpressionError::EquationCount {
                expected: var_names.len(),
                found: equations.len(),
            });
        }
        if param_values.len() != param_names.len() {
            return Err(ExpressionError::ParameterCount {
                expected: param_names.len(),
                found: param_values.len(),
            });
        }

        let var_names: Vec<String> = var_names.iter().map(|s| s.to_string()).collect();
        let param_names: Vec<String> = param_names.iter().map(|s| s.to_string()).collect();
        let compiler = Compiler::new(&var_names, &param_names)?;
        let equations = var_names
            .iter()
            .zip(equations)
            .map(|(name, source)| {
                parse(source)
                    .and_then(|expr| compiler.compile(&expr))
                    .map_err(|err| ExpressionError::InEquation {
                        name: name.clone(),
                        source: Box::new(err),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            var_names,
            param_names,
            params: param_values.iter().map(|&p| ExtFloat::from(p)).collect(),
            equations,
        })
    }

    pub fn dimension(&self) -> usize {
        self.equations.len()
    }

    pub fn variables(&self) -> &[String] {
        &self.var_names
    }

    pub fn parameters(&self) -> &[String] {
        &self.param_names
    }

    /// Replaces a parameter value; `value` is parsed at full extended precision.
    pub fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), ExpressionError> {
        let idx = self
            .param_names
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| ExpressionError::UnknownIdentifier(name.to_string()))?;
        self.params[idx] = ExtFloat::from_decimal(value)
            .ok_or_else(|| ExpressionError::InvalidNumber(value.to_string()))?;
        Ok(())
    }
}

impl<T: Scalar> VectorField<T> for ExpressionField {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        let params: Vec<T> = self.params.iter().map(|&p| T::from_extended(p)).collect();
        let depth = self.equations.iter().map(|eq| eq.max_depth).max().unwrap_or(0);
        let mut stack = Vec::with_capacity(depth);
        let frame = Frame {
            t,
            vars: x,
            params: &params,
        };
        for (slot, eq) in out.iter_mut().zip(&self.equations) {
            *slot = VM::execute(eq, &frame, &mut stack);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse, Compiler, Expr, ExpressionError, ExpressionField, Frame, OpCode, VM};
    use crate::autodiff::Dual;
    use crate::double_double::ExtFloat;
    use crate::jacobian::dual_jacobian;
    use crate::traits::{Scalar, VectorField};

    fn eval(source: &str, vars: &[f64]) -> f64 {
        let names: Vec<String> = ["x", "y"].iter().map(|s| s.to_string()).collect();
        let compiler = Compiler::new(&names, &[]).unwrap();
        let code = compiler.compile(&parse(source).unwrap()).unwrap();
        let frame = Frame {
            t: 0.5,
            vars,
            params: &[],
        };
        VM::execute(&code, &frame, &mut Vec::new())
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3", &[0.0, 0.0]), 7.0);
        assert_eq!(eval("2 ^ 3 ^ 2", &[0.0, 0.0]), 512.0);
        assert_eq!(eval("-x ^ 2", &[3.0, 0.0]), -9.0);
        assert_eq!(eval("x ^ -1", &[4.0, 0.0]), 0.25);
        assert_eq!(eval("(x - y) / 2 - 1", &[5.0, 1.0]), 1.0);
        assert_eq!(eval("t * 4", &[0.0, 0.0]), 2.0);
    }

    #[test]
    fn functions_and_exponent_literals() {
        assert!((eval("exp(ln(x)) - x", &[2.5, 0.0])).abs() < 1e-15);
        assert_eq!(eval("sqrt(x) + 1.5e1", &[16.0, 0.0]), 19.0);
        assert_eq!(eval("2.5E-1 * x", &[8.0, 0.0]), 2.0);
        assert!((eval("sin(x)^2 + cos(x)^2", &[0.7, 0.0]) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn integer_powers_avoid_powf() {
        let names = vec!["x".to_string()];
        let compiler = Compiler::new(&names, &[]).unwrap();
        let code = compiler.compile(&parse("x^3").unwrap()).unwrap();
        assert_eq!(code.ops, vec![OpCode::LoadVar(0), OpCode::PowI(3)]);
        let code = compiler.compile(&parse("x^0.5").unwrap()).unwrap();
        assert_eq!(code.ops.last(), Some(&OpCode::Pow));
    }

    #[test]
    fn parse_errors_are_reported() {
        assert_eq!(parse("1 +"), Err(ExpressionError::UnexpectedEnd));
        assert!(matches!(
            parse("x $ y"),
            Err(ExpressionError::UnexpectedCharacter { ch: '$', position: 2 })
        ));
        assert!(matches!(parse("(x"), Err(ExpressionError::UnexpectedEnd)));
        assert!(matches!(
            parse("x y"),
            Err(ExpressionError::UnexpectedToken { position: 2, .. })
        ));
        assert!(matches!(parse("1.2.3"), Err(ExpressionError::InvalidNumber(_))));
        assert_eq!(
            parse("-x"),
            Ok(Expr::Neg(Box::new(Expr::Variable("x".into()))))
        );
    }

    #[test]
    fn compile_errors_are_reported() {
        let names = vec!["x".to_string()];
        let compiler = Compiler::new(&names, &[]).unwrap();
        assert_eq!(
            compiler.compile(&parse("z + 1").unwrap()),
            Err(ExpressionError::UnknownIdentifier("z".into()))
        );
        assert_eq!(
            compiler.compile(&parse("tan(x)").unwrap()),
            Err(ExpressionError::UnknownFunction("tan".into()))
        );
        assert!(matches!(
            Compiler::new(&["t".to_string()], &[]),
            Err(ExpressionError::DuplicateName(_))
        ));
        assert!(matches!(
            Compiler::new(&names, &names),
            Err(ExpressionError::DuplicateName(_))
        ));
    }

    #[test]
    fn field_evaluates_in_every_precision() {
        let field = ExpressionField::new(&["x", "y"], &["a * y", "-x / 3"], &["a"], &[2.0]).unwrap();
        assert_eq!(field.dimension(), 2);

        let mut out = [0.0f64; 2];
        field.apply(0.0, &[1.5, 2.0], &mut out);
        assert_eq!(out, [4.0, -0.5]);

        let mut wide = [ExtFloat::from(0.0); 2];
        field.apply(ExtFloat::from(0.0), &[ExtFloat::from(1.0), ExtFloat::from(0.0)], &mut wide);
        assert_eq!(wide[1], ExtFloat::from(-1.0) / ExtFloat::from(3.0));

        let j = dual_jacobian(&field, 0.0_f64, &[1.0, 1.0]).unwrap();
        assert_eq!(j[(0, 1)], 2.0);
        assert!((j[(1, 0)] + 1.0 / 3.0).abs() < 1e-16);
    }

    #[test]
    fn literals_keep_extended_digits() {
        let field = ExpressionField::new(&["x"], &["0.1 * x"], &[], &[]).unwrap();
        let mut out = [ExtFloat::from(0.0)];
        field.apply(ExtFloat::from(0.0), &[ExtFloat::from(1.0)], &mut out);
        let tenth = ExtFloat::from(1.0) / ExtFloat::from(10.0);
        assert!((out[0] - tenth).to_reference().abs() < 1e-32);
    }

    #[test]
    fn parameters_can_be_updated() {
        let mut field = ExpressionField::new(&["x"], &["k * x"], &["k"], &[1.0]).unwrap();
        field.set_parameter("k", "-2.5").unwrap();
        let mut out = [Dual::lift(0.0)];
        field.apply(Dual::lift(0.0), &[Dual::seed(2.0)], &mut out);
        assert_eq!(out[0].val, -5.0);
        assert_eq!(out[0].eps, -2.5);
        assert!(matches!(
            field.set_parameter("q", "1"),
            Err(ExpressionError::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn construction_errors_name_the_equation() {
        let err = ExpressionField::new(&["x", "y"], &["y", "x +"], &[], &[]).unwrap_err();
        assert!(err.to_string().contains("'y'"));
        assert!(matches!(
            ExpressionField::new(&["x"], &["x", "x"], &[], &[]),
            Err(ExpressionError::EquationCount { expected: 1, found: 2 })
        ));
    }
}
