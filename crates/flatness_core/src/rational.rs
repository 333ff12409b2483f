use crate::polynomial::{gcd, Polynomial};
use crate::symbol::Symbol;
use num_rational::BigRational;
use num_traits::{One, Zero};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// A quotient of two polynomials; the entry type of every symbolic matrix.
///
/// Arithmetic is lazy: `+`, `-` and `*` do not cancel common factors. Call
/// [`RationalFunction::simplify`] to obtain the canonical form (numerator and
/// denominator coprime, denominator monic), after which structural equality is
/// mathematical equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RationalFunction {
    num: Polynomial,
    den: Polynomial,
}

impl RationalFunction {
    /// `None` if the denominator is the zero polynomial.
    pub fn new(num: Polynomial, den: Polynomial) -> Option<Self> {
        if den.is_zero() {
            None
        } else {
            Some(Self { num, den })
        }
    }

    pub fn zero() -> Self {
        Self::from_polynomial(Polynomial::zero())
    }

    pub fn one() -> Self {
        Self::from_polynomial(Polynomial::one())
    }

    pub fn constant(c: BigRational) -> Self {
        Self::from_polynomial(Polynomial::constant(c))
    }

    pub fn integer(v: i64) -> Self {
        Self::constant(BigRational::from_integer(v.into()))
    }

    pub fn from_symbol(symbol: Symbol) -> Self {
        Self::from_polynomial(Polynomial::from_symbol(symbol))
    }

    pub fn from_polynomial(num: Polynomial) -> Self {
        Self {
            num,
            den: Polynomial::one(),
        }
    }

    pub fn numerator(&self) -> &Polynomial {
        &self.num
    }

    pub fn denominator(&self) -> &Polynomial {
        &self.den
    }

    /// Exact zero test; holds in any form, simplified or not.
    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }

    pub fn is_polynomial(&self) -> bool {
        self.den.is_constant()
    }

    pub fn constant_value(&self) -> Option<BigRational> {
        let num = self.num.constant_value()?;
        let den = self.den.constant_value()?;
        Some(num / den)
    }

    /// Rough expression size, used to prefer small pivots during elimination.
    pub fn complexity(&self) -> usize {
        self.num.num_terms() + self.den.num_terms()
    }

    pub fn symbols(&self) -> BTreeSet<Symbol> {
        let mut out = self.num.symbols();
        out.extend(self.den.symbols());
        out
    }

    /// Canonical form: common factors cancelled, monic denominator.
    pub fn simplify(&self) -> Self {
        if self.num.is_zero() {
            return Self::zero();
        }
        let g = gcd(&self.num, &self.den);
        let (num, den) = if g.is_constant() {
            (self.num.clone(), self.den.clone())
        } else {
            match (self.num.exact_div(&g), self.den.exact_div(&g)) {
                (Some(num), Some(den)) => (num, den),
                _ => (self.num.clone(), self.den.clone()),
            }
        };
        let lc = den.leading_coefficient();
        if lc.is_one() {
            return Self { num, den };
        }
        let inv = lc.recip();
        Self {
            num: num.scale(&inv),
            den: den.scale(&inv),
        }
    }

    pub fn recip(&self) -> Option<Self> {
        Self::new(self.den.clone(), self.num.clone())
    }

    pub fn checked_div(&self, rhs: &RationalFunction) -> Option<Self> {
        Some(self * &rhs.recip()?)
    }

    /// Integer power; negative exponents need a nonzero base.
    pub fn pow(&self, exp: i64) -> Option<Self> {
        let magnitude = u32::try_from(exp.unsigned_abs()).ok()?;
        let raised = Self {
            num: self.num.pow(magnitude),
            den: self.den.pow(magnitude),
        };
        if exp < 0 {
            raised.recip()
        } else {
            Some(raised)
        }
    }

    /// Partial derivative with respect to `symbol` (quotient rule).
    pub fn derivative(&self, symbol: &Symbol) -> Self {
        let dn = self.num.derivative(symbol);
        let dd = self.den.derivative(symbol);
        if dd.is_zero() {
            return Self {
                num: dn,
                den: self.den.clone(),
            };
        }
        Self {
            num: &(&dn * &self.den) - &(&self.num * &dd),
            den: &self.den * &self.den,
        }
    }

    /// Exact value at a point, `None` on a pole or a missing symbol.
    pub fn eval(&self, assignment: &BTreeMap<Symbol, BigRational>) -> Option<BigRational> {
        let den = self.den.eval(assignment)?;
        if den.is_zero() {
            return None;
        }
        Some(self.num.eval(assignment)? / den)
    }

    /// Substitutes the assigned symbols only; `None` if the denominator vanishes.
    pub fn partial_eval(&self, assignment: &BTreeMap<Symbol, BigRational>) -> Option<Self> {
        Self::new(
            self.num.partial_eval(assignment),
            self.den.partial_eval(assignment),
        )
    }
}

impl Add for &RationalFunction {
    type Output = RationalFunction;
    fn add(self, rhs: &RationalFunction) -> RationalFunction {
        if self.is_zero() {
            return rhs.clone();
        }
        if rhs.is_zero() {
            return self.clone();
        }
        if self.den == rhs.den {
            return RationalFunction {
                num: &self.num + &rhs.num,
                den: self.den.clone(),
            };
        }
        RationalFunction {
            num: &(&self.num * &rhs.den) + &(&rhs.num * &self.den),
            den: &self.den * &rhs.den,
        }
    }
}

impl Sub for &RationalFunction {
    type Output = RationalFunction;
    fn sub(self, rhs: &RationalFunction) -> RationalFunction {
        self + &(-rhs)
    }
}

impl Mul for &RationalFunction {
    type Output = RationalFunction;
    fn mul(self, rhs: &RationalFunction) -> RationalFunction {
        if self.is_zero() || rhs.is_zero() {
            return RationalFunction::zero();
        }
        RationalFunction {
            num: &self.num * &rhs.num,
            den: &self.den * &rhs.den,
        }
    }
}

impl Neg for &RationalFunction {
    type Output = RationalFunction;
    fn neg(self) -> RationalFunction {
        RationalFunction {
            num: -&self.num,
            den: self.den.clone(),
        }
    }
}

impl fmt::Display for RationalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den.is_one() {
            return write!(f, "{}", self.num);
        }
        if self.num.num_terms() > 1 {
            write!(f, "({})", self.num)?;
        } else {
            write!(f, "{}", self.num)?;
        }
        write!(f, "/({})", self.den)
    }
}
