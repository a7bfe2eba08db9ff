use crate::traits::{PlanarSystem, State};
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;

/// OpCodes for the Stack-based Virtual Machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a state variable (0 = abscissa, 1 = ordinate).
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes f(a).
    Call(Function),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Sinh,
    Cosh,
    Tanh,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "exp" => Function::Exp,
            "ln" => Function::Ln,
            "log" => Function::Log10,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "sinh" => Function::Sinh,
            "cosh" => Function::Cosh,
            "tanh" => Function::Tanh,
            _ => return None,
        })
    }

    fn apply(self, a: f64) -> f64 {
        match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Exp => a.exp(),
            Function::Ln => a.ln(),
            Function::Log10 => a.log10(),
            Function::Sqrt => a.sqrt(),
            Function::Abs => a.abs(),
            Function::Sinh => a.sinh(),
            Function::Cosh => a.cosh(),
            Function::Tanh => a.tanh(),
        }
    }
}

const CONSTANTS: [(&str, f64); 1] = [("pi", std::f64::consts::PI)];

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; `execute` takes all necessary context and returns the
/// value left on the stack. Malformed bytecode and out-of-range indices
/// evaluate to NaN instead of panicking.
pub struct VM;

impl VM {
    pub fn execute(bytecode: &Bytecode, vars: &[f64], params: &[f64], stack: &mut Vec<f64>) -> f64 {
        stack.clear();

        for op in &bytecode.ops {
            let value = match *op {
                OpCode::LoadConst(val) => val,
                OpCode::LoadVar(idx) => vars.get(idx).copied().unwrap_or(f64::NAN),
                OpCode::LoadParam(idx) => params.get(idx).copied().unwrap_or(f64::NAN),
                OpCode::Neg => -stack.pop().unwrap_or(f64::NAN),
                OpCode::Call(function) => function.apply(stack.pop().unwrap_or(f64::NAN)),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = stack.pop().unwrap_or(f64::NAN);
                    let a = stack.pop().unwrap_or(f64::NAN);
                    match op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => pow(a, b),
                    }
                }
            };
            stack.push(value);
        }

        match (stack.pop(), stack.is_empty()) {
            (Some(value), true) => value,
            _ => f64::NAN,
        }
    }
}

/// Integer exponents go through `powi` so negative bases stay real.
fn pow(a: f64, b: f64) -> f64 {
    if b.fract() == 0.0 && b.abs() <= f64::from(i32::MAX) {
        a.powi(b as i32)
    } else {
        a.powf(b)
    }
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>),
    Neg(Box<Expr>),
    Call(String, Box<Expr>),
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable and parameter names to indices.
pub struct Compiler {
    var_map: HashMap<String, usize>,
    param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Self {
        let index = |names: &[String]| -> HashMap<String, usize> {
            names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect()
        };
        Self {
            var_map: index(var_names),
            param_map: index(param_names),
        }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<()> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else if let Some(&(_, value)) = CONSTANTS.iter().find(|(c, _)| *c == name.as_str()) {
                    ops.push(OpCode::LoadConst(value));
                } else {
                    bail!("Unknown variable or parameter: {name}");
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    _ => bail!("Unknown binary operator: {op}"),
                });
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(func, arg) => {
                let function =
                    Function::from_name(func).ok_or_else(|| anyhow!("Unknown function: {func}"))?;
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(function));
            }
        }
        Ok(())
    }
}

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        bail!("Expression is empty");
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        bail!("Unexpected trailing token {token:?}");
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
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
                } else if d == 'e' || d == 'E' {
                    num_str.push(d);
                    chars.next();
                    if let Some(&sign) = chars.peek() {
                        if sign == '+' || sign == '-' {
                            num_str.push(sign);
                            chars.next();
                        }
                    }
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .with_context(|| format!("Invalid number literal '{num_str}'"))?;
            tokens.push(Token::Number(value));
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
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => bail!("Unexpected character '{c}'"),
            });
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            Some(other) => bail!("Expected ')', found {other:?}"),
            None => bail!("Expected ')' before end of input"),
        }
    }

    /// `+` and `-`, left associative.
    fn parse_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => '+',
                Some(Token::Minus) => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    /// `*` and `/`, left associative.
    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => '*',
                Some(Token::Slash) => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    /// Unary signs bind looser than `^`, so `-x^2` is `-(x^2)`.
    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// `^`, right associative.
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(other) => bail!("Unexpected token {other:?}"),
            None => bail!("Unexpected end of input"),
        }
    }
}

// --- ExpressionSystem ---

/// A planar system defined by two user equations, compiled once to bytecode.
///
/// Parameters are positional, in the order of `param_names`. Each evaluation
/// allocates its own stack, so the system is `Sync`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionSystem {
    equations: [Bytecode; 2],
    var_names: [String; 2],
    param_names: Vec<String>,
}

impl ExpressionSystem {
    pub fn compile<E, V, P>(equations: &[E], var_names: &[V], param_names: &[P]) -> Result<Self>
    where
        E: AsRef<str>,
        V: AsRef<str>,
        P: AsRef<str>,
    {
        if equations.len() != 2 {
            bail!("Expected 2 equations, got {}", equations.len());
        }
        if var_names.len() != 2 {
            bail!("Expected 2 state variable names, got {}", var_names.len());
        }
        let var_names: Vec<String> = var_names.iter().map(|v| v.as_ref().to_string()).collect();
        let param_names: Vec<String> = param_names.iter().map(|p| p.as_ref().to_string()).collect();

        let mut seen = Vec::with_capacity(var_names.len() + param_names.len());
        for name in var_names.iter().chain(&param_names) {
            validate_identifier(name)?;
            if seen.contains(&name) {
                bail!("Duplicate name '{name}'");
            }
            seen.push(name);
        }

        let compiler = Compiler::new(&var_names, &param_names);
        let mut compiled = Vec::with_capacity(2);
        for (equation, var) in equations.iter().zip(&var_names) {
            let source = equation.as_ref();
            let bytecode = parse(source)
                .and_then(|expr| compiler.compile(&expr))
                .with_context(|| format!("Failed to compile equation for d{var}/dt: '{source}'"))?;
            compiled.push(bytecode);
        }

        let [f, g]: [Bytecode; 2] = compiled
            .try_into()
            .map_err(|_| anyhow!("Expected exactly 2 compiled equations"))?;
        let [x, y]: [String; 2] = var_names
            .try_into()
            .map_err(|_| anyhow!("Expected exactly 2 state variable names"))?;

        Ok(Self {
            equations: [f, g],
            var_names: [x, y],
            param_names,
        })
    }

    pub fn var_names(&self) -> &[String; 2] {
        &self.var_names
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn check_params(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.param_names.len() {
            bail!(
                "Expected {} parameter value(s) for [{}], got {}",
                self.param_names.len(),
                self.param_names.join(", "),
                params.len()
            );
        }
        Ok(())
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_');
    if !valid {
        bail!("Invalid identifier '{name}'");
    }
    if Function::from_name(name).is_some() || CONSTANTS.iter().any(|(c, _)| *c == name) {
        bail!("'{name}' is reserved");
    }
    Ok(())
}

impl PlanarSystem for ExpressionSystem {
    type Params = Vec<f64>;

    /// Wrong parameter counts evaluate to NaN; see [`ExpressionSystem::check_params`].
    fn evaluate(&self, state: &State, params: &Vec<f64>) -> State {
        if params.len() != self.param_names.len() {
            return State::repeat(f64::NAN);
        }
        let vars = [state.x, state.y];
        let mut stack = Vec::with_capacity(16);
        State::new(
            VM::execute(&self.equations[0], &vars, params, &mut stack),
            VM::execute(&self.equations[1], &vars, params, &mut stack),
        )
    }
}
