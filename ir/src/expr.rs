//! Symbolic integer expressions.
//!
//! `Expr` is the currency of the scheduler: definition right-hand sides,
//! left-hand-side index expressions, reduction-domain bounds, and interval
//! endpoints are all `Expr`s. The tree is deliberately small - the scheduler
//! only ever needs affine-ish index arithmetic, min/max clamping, and point
//! calls into other functions or input buffers.
//!
//! Children are reference counted (`Rc`) so subtrees can be shared freely
//! within the single-threaded scheduling pass.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal.
    IntImm(i64),
    /// Loop variable or pure function argument.
    Var(String),
    /// Scalar pipeline parameter; replaced by its integer estimate before
    /// any bounds query.
    Param(String),
    Add(Rc<Expr>, Rc<Expr>),
    Sub(Rc<Expr>, Rc<Expr>),
    Mul(Rc<Expr>, Rc<Expr>),
    /// Euclidean division.
    Div(Rc<Expr>, Rc<Expr>),
    Min(Rc<Expr>, Rc<Expr>),
    Max(Rc<Expr>, Rc<Expr>),
    /// Point access to another function or to an input buffer.
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::IntImm(value)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expr::Param(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call { name: name.into(), args }
    }

    pub fn min(a: Expr, b: Expr) -> Self {
        Expr::Min(Rc::new(a), Rc::new(b))
    }

    pub fn max(a: Expr, b: Expr) -> Self {
        Expr::Max(Rc::new(a), Rc::new(b))
    }

    pub fn div(a: Expr, b: Expr) -> Self {
        Expr::Div(Rc::new(a), Rc::new(b))
    }

    /// Constant value if this is a literal.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Expr::IntImm(v) => Some(*v),
            _ => None,
        }
    }

    /// Variable name if this is a plain variable.
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Expr::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Pre-order traversal over the whole tree, including call arguments.
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::IntImm(_) | Expr::Var(_) | Expr::Param(_) => {}
            Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b)
            | Expr::Min(a, b)
            | Expr::Max(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
        }
    }

    /// Visit every call in the tree, outermost first.
    pub fn for_each_call(&self, f: &mut impl FnMut(&str, &[Expr])) {
        self.visit(&mut |e| {
            if let Expr::Call { name, args } = e {
                f(name, args);
            }
        });
    }

    /// Names of all functions and inputs called anywhere in the tree.
    pub fn called_names(&self, out: &mut BTreeSet<String>) {
        self.for_each_call(&mut |name, _| {
            out.insert(name.to_string());
        });
    }

    pub fn uses_var(&self, var: &str) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if let Expr::Var(name) = e
                && name == var
            {
                found = true;
            }
        });
        found
    }

    /// Replace variables by expressions. Call arguments are rewritten too;
    /// call names are left alone.
    pub fn substitute(&self, subs: &BTreeMap<String, Expr>) -> Expr {
        let rebuild = |a: &Rc<Expr>, b: &Rc<Expr>| (Rc::new(a.substitute(subs)), Rc::new(b.substitute(subs)));
        match self {
            Expr::IntImm(_) | Expr::Param(_) => self.clone(),
            Expr::Var(name) => subs.get(name).cloned().unwrap_or_else(|| self.clone()),
            Expr::Add(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Add(a, b)
            }
            Expr::Sub(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Sub(a, b)
            }
            Expr::Mul(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Mul(a, b)
            }
            Expr::Div(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Div(a, b)
            }
            Expr::Min(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Min(a, b)
            }
            Expr::Max(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Max(a, b)
            }
            Expr::Call { name, args } => {
                Expr::Call { name: name.clone(), args: args.iter().map(|a| a.substitute(subs)).collect() }
            }
        }
    }

    /// Replace scalar parameters by their integer estimates.
    pub fn substitute_params(&self, estimates: &BTreeMap<String, i64>) -> Expr {
        let rebuild =
            |a: &Rc<Expr>, b: &Rc<Expr>| (Rc::new(a.substitute_params(estimates)), Rc::new(b.substitute_params(estimates)));
        match self {
            Expr::IntImm(_) | Expr::Var(_) => self.clone(),
            Expr::Param(name) => match estimates.get(name) {
                Some(v) => Expr::IntImm(*v),
                None => self.clone(),
            },
            Expr::Add(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Add(a, b)
            }
            Expr::Sub(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Sub(a, b)
            }
            Expr::Mul(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Mul(a, b)
            }
            Expr::Div(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Div(a, b)
            }
            Expr::Min(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Min(a, b)
            }
            Expr::Max(a, b) => {
                let (a, b) = rebuild(a, b);
                Expr::Max(a, b)
            }
            Expr::Call { name, args } => {
                Expr::Call { name: name.clone(), args: args.iter().map(|a| a.substitute_params(estimates)).collect() }
            }
        }
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::IntImm(value)
    }
}

macro_rules! binary_op_impls {
    ($($trait:ident, $method:ident => $variant:ident),* $(,)?) => {
        $(
            impl std::ops::$trait for Expr {
                type Output = Expr;
                fn $method(self, rhs: Expr) -> Expr {
                    Expr::$variant(Rc::new(self), Rc::new(rhs))
                }
            }

            impl std::ops::$trait<i64> for Expr {
                type Output = Expr;
                fn $method(self, rhs: i64) -> Expr {
                    Expr::$variant(Rc::new(self), Rc::new(Expr::IntImm(rhs)))
                }
            }
        )*
    }
}

binary_op_impls! {
    Add, add => Add,
    Sub, sub => Sub,
    Mul, mul => Mul,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntImm(v) => write!(f, "{v}"),
            Expr::Var(name) | Expr::Param(name) => write!(f, "{name}"),
            Expr::Add(a, b) => write!(f, "({a} + {b})"),
            Expr::Sub(a, b) => write!(f, "({a} - {b})"),
            Expr::Mul(a, b) => write!(f, "({a}*{b})"),
            Expr::Div(a, b) => write!(f, "({a}/{b})"),
            Expr::Min(a, b) => write!(f, "min({a}, {b})"),
            Expr::Max(a, b) => write!(f, "max({a}, {b})"),
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}
