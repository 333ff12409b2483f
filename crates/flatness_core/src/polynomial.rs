//! Sparse multivariate polynomials over the rationals.
//!
//! Terms are kept in a `BTreeMap` keyed by [`Monomial`], whose ordering is the
//! lexicographic monomial order induced by the [`Symbol`] ordering. The last
//! entry of the map is therefore always the leading term.
//!
//! Besides the ring operations this module provides exact division,
//! pseudo-remainders and a recursive (primitive PRS) GCD, which is what keeps
//! rational-function entries in canonical, reduced form.

use crate::symbol::Symbol;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// A power product of symbols. Sorted by symbol, never stores zero exponents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Monomial {
    powers: Vec<(Symbol, u32)>,
}

impl Monomial {
    pub fn one() -> Self {
        Self { powers: Vec::new() }
    }

    pub fn from_symbol(symbol: Symbol, power: u32) -> Self {
        if power == 0 {
            Self::one()
        } else {
            Self {
                powers: vec![(symbol, power)],
            }
        }
    }

    pub fn is_one(&self) -> bool {
        self.powers.is_empty()
    }

    pub fn powers(&self) -> &[(Symbol, u32)] {
        &self.powers
    }

    pub fn degree(&self, symbol: &Symbol) -> u32 {
        self.powers
            .binary_search_by(|(s, _)| s.cmp(symbol))
            .map(|idx| self.powers[idx].1)
            .unwrap_or(0)
    }

    pub fn total_degree(&self) -> u32 {
        self.powers.iter().map(|(_, e)| *e).sum()
    }

    pub fn mul(&self, other: &Monomial) -> Monomial {
        let mut powers = Vec::with_capacity(self.powers.len() + other.powers.len());
        let (mut i, mut j) = (0, 0);
        while i < self.powers.len() && j < other.powers.len() {
            let (sa, ea) = &self.powers[i];
            let (sb, eb) = &other.powers[j];
            match sa.cmp(sb) {
                Ordering::Less => {
                    powers.push((sa.clone(), *ea));
                    i += 1;
                }
                Ordering::Greater => {
                    powers.push((sb.clone(), *eb));
                    j += 1;
                }
                Ordering::Equal => {
                    powers.push((sa.clone(), ea + eb));
                    i += 1;
                    j += 1;
                }
            }
        }
        powers.extend(self.powers[i..].iter().cloned());
        powers.extend(other.powers[j..].iter().cloned());
        Monomial { powers }
    }

    /// Exact quotient, `None` if `other` does not divide `self`.
    pub fn div(&self, other: &Monomial) -> Option<Monomial> {
        let mut powers = Vec::with_capacity(self.powers.len());
        let mut j = 0;
        for (sym, exp) in &self.powers {
            let mut remaining = *exp;
            if j < other.powers.len() {
                let (osym, oexp) = &other.powers[j];
                match osym.cmp(sym) {
                    Ordering::Less => return None,
                    Ordering::Equal => {
                        if *oexp > *exp {
                            return None;
                        }
                        remaining = exp - oexp;
                        j += 1;
                    }
                    Ordering::Greater => {}
                }
            }
            if remaining > 0 {
                powers.push((sym.clone(), remaining));
            }
        }
        if j < other.powers.len() {
            return None;
        }
        Some(Monomial { powers })
    }

    /// The monomial with `symbol` removed.
    pub fn without(&self, symbol: &Symbol) -> Monomial {
        Monomial {
            powers: self
                .powers
                .iter()
                .filter(|(s, _)| s != symbol)
                .cloned()
                .collect(),
        }
    }

    /// Lexicographic comparison; a smaller symbol is the more significant variable.
    pub fn lex_cmp(&self, other: &Monomial) -> Ordering {
        let (mut i, mut j) = (0, 0);
        loop {
            match (self.powers.get(i), other.powers.get(j)) {
                (None, None) => return Ordering::Equal,
                (Some(_), None) => return Ordering::Greater,
                (None, Some(_)) => return Ordering::Less,
                (Some((sa, ea)), Some((sb, eb))) => match sa.cmp(sb) {
                    Ordering::Less => return Ordering::Greater,
                    Ordering::Greater => return Ordering::Less,
                    Ordering::Equal => match ea.cmp(eb) {
                        Ordering::Equal => {
                            i += 1;
                            j += 1;
                        }
                        ord => return ord,
                    },
                },
            }
        }
    }
}

impl PartialOrd for Monomial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Monomial {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lex_cmp(other)
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.powers.is_empty() {
            return write!(f, "1");
        }
        for (idx, (sym, exp)) in self.powers.iter().enumerate() {
            if idx > 0 {
                write!(f, "*")?;
            }
            if *exp == 1 {
                write!(f, "{sym}")?;
            } else {
                write!(f, "{sym}^{exp}")?;
            }
        }
        Ok(())
    }
}

/// A multivariate polynomial with exact rational coefficients.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Polynomial {
    terms: BTreeMap<Monomial, BigRational>,
}

impl Polynomial {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn one() -> Self {
        Self::constant(BigRational::one())
    }

    pub fn constant(c: BigRational) -> Self {
        Self::term(Monomial::one(), c)
    }

    pub fn from_symbol(symbol: Symbol) -> Self {
        Self::term(Monomial::from_symbol(symbol, 1), BigRational::one())
    }

    pub fn term(monomial: Monomial, coeff: BigRational) -> Self {
        let mut terms = BTreeMap::new();
        if !coeff.is_zero() {
            terms.insert(monomial, coeff);
        }
        Self { terms }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_constant(&self) -> bool {
        match self.terms.len() {
            0 => true,
            1 => self.terms.keys().all(Monomial::is_one),
            _ => false,
        }
    }

    pub fn is_one(&self) -> bool {
        self.constant_value().map_or(false, |c| c.is_one())
    }

    pub fn constant_value(&self) -> Option<BigRational> {
        if !self.is_constant() {
            return None;
        }
        Some(
            self.terms
                .values()
                .next()
                .cloned()
                .unwrap_or_else(BigRational::zero),
        )
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> impl DoubleEndedIterator<Item = (&Monomial, &BigRational)> {
        self.terms.iter()
    }

    pub fn leading_term(&self) -> Option<(&Monomial, &BigRational)> {
        self.terms.iter().next_back()
    }

    pub fn leading_coefficient(&self) -> BigRational {
        self.leading_term()
            .map(|(_, c)| c.clone())
            .unwrap_or_else(BigRational::zero)
    }

    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.terms
            .keys()
            .flat_map(|m| m.powers().iter().map(|(s, _)| s.clone()))
            .collect()
    }

    pub fn degree_in(&self, symbol: &Symbol) -> u32 {
        self.terms.keys().map(|m| m.degree(symbol)).max().unwrap_or(0)
    }

    fn add_term(&mut self, monomial: Monomial, coeff: BigRational) {
        if coeff.is_zero() {
            return;
        }
        match self.terms.get_mut(&monomial) {
            Some(existing) => {
                *existing += coeff;
                if existing.is_zero() {
                    self.terms.remove(&monomial);
                }
            }
            None => {
                self.terms.insert(monomial, coeff);
            }
        }
    }

    pub fn scale(&self, c: &BigRational) -> Polynomial {
        if c.is_zero() {
            return Polynomial::zero();
        }
        Polynomial {
            terms: self
                .terms
                .iter()
                .map(|(m, coeff)| (m.clone(), coeff * c))
                .collect(),
        }
    }

    pub fn mul_monomial(&self, monomial: &Monomial) -> Polynomial {
        Polynomial {
            terms: self
                .terms
                .iter()
                .map(|(m, c)| (m.mul(monomial), c.clone()))
                .collect(),
        }
    }

    pub fn pow(&self, mut exp: u32) -> Polynomial {
        let mut result = Polynomial::one();
        let mut base = self.clone();
        while exp > 0 {
            if exp & 1 == 1 {
                result = &result * &base;
            }
            exp >>= 1;
            if exp > 0 {
                base = &base * &base;
            }
        }
        result
    }

    /// Partial derivative with respect to `symbol`.
    pub fn derivative(&self, symbol: &Symbol) -> Polynomial {
        let mut out = Polynomial::zero();
        for (m, c) in &self.terms {
            let exp = m.degree(symbol);
            if exp == 0 {
                continue;
            }
            let lowered = m
                .without(symbol)
                .mul(&Monomial::from_symbol(symbol.clone(), exp - 1));
            out.add_term(lowered, c * BigRational::from_integer(exp.into()));
        }
        out
    }

    /// Coefficients with respect to `symbol`, keyed by exponent.
    pub fn coefficients_in(&self, symbol: &Symbol) -> BTreeMap<u32, Polynomial> {
        let mut out: BTreeMap<u32, Polynomial> = BTreeMap::new();
        for (m, c) in &self.terms {
            out.entry(m.degree(symbol))
                .or_default()
                .add_term(m.without(symbol), c.clone());
        }
        out
    }

    pub fn coeff_in(&self, symbol: &Symbol, k: u32) -> Polynomial {
        let mut out = Polynomial::zero();
        for (m, c) in &self.terms {
            if m.degree(symbol) == k {
                out.add_term(m.without(symbol), c.clone());
            }
        }
        out
    }

    /// Scales the polynomial so its leading coefficient is one.
    pub fn monic(&self) -> Polynomial {
        if self.is_zero() {
            return Polynomial::zero();
        }
        let lc = self.leading_coefficient();
        if lc.is_one() {
            return self.clone();
        }
        self.scale(&lc.recip())
    }

    /// Exact multivariate division, `None` when `divisor` does not divide `self`.
    pub fn exact_div(&self, divisor: &Polynomial) -> Option<Polynomial> {
        let (lead_m, lead_c) = divisor.leading_term()?;
        let (lead_m, lead_c) = (lead_m.clone(), lead_c.clone());
        let mut remainder = self.clone();
        let mut quotient = Polynomial::zero();
        while let Some((m, c)) = remainder.leading_term() {
            let qm = m.div(&lead_m)?;
            let qc = c / &lead_c;
            let step = Polynomial::term(qm, qc);
            remainder = &remainder - &(divisor * &step);
            quotient = &quotient + &step;
        }
        Some(quotient)
    }

    /// Pseudo-remainder of `self` by `divisor`, both viewed as univariate in `symbol`.
    pub fn pseudo_remainder(&self, divisor: &Polynomial, symbol: &Symbol) -> Polynomial {
        if divisor.is_zero() {
            return self.clone();
        }
        let deg_d = divisor.degree_in(symbol);
        let lc_d = divisor.coeff_in(symbol, deg_d);
        let mut r = self.clone();
        while !r.is_zero() {
            let deg_r = r.degree_in(symbol);
            if deg_r < deg_d {
                break;
            }
            let lc_r = r.coeff_in(symbol, deg_r);
            let shift = Monomial::from_symbol(symbol.clone(), deg_r - deg_d);
            let subtractor = (&lc_r * divisor).mul_monomial(&shift);
            r = &(&r * &lc_d) - &subtractor;
        }
        r
    }

    /// GCD of the coefficients with respect to `symbol`.
    pub fn content_in(&self, symbol: &Symbol) -> Polynomial {
        let mut content = Polynomial::zero();
        for coeff in self.coefficients_in(symbol).into_values() {
            content = gcd(&content, &coeff);
            if content.is_constant() {
                return Polynomial::one();
            }
        }
        content
    }

    pub fn primitive_part_in(&self, symbol: &Symbol) -> Polynomial {
        if self.is_zero() {
            return Polynomial::zero();
        }
        let content = self.content_in(symbol);
        self.exact_div(&content).unwrap_or_else(|| self.clone())
    }

    /// Full evaluation; `None` if a symbol is missing from `assignment`.
    pub fn eval(&self, assignment: &BTreeMap<Symbol, BigRational>) -> Option<BigRational> {
        let mut total = BigRational::zero();
        for (m, c) in &self.terms {
            let mut value = c.clone();
            for (sym, exp) in m.powers() {
                let base = assignment.get(sym)?;
                value *= rational_pow(base, *exp);
            }
            total += value;
        }
        Some(total)
    }

    /// Substitutes the assigned symbols and keeps the others symbolic.
    pub fn partial_eval(&self, assignment: &BTreeMap<Symbol, BigRational>) -> Polynomial {
        let mut out = Polynomial::zero();
        for (m, c) in &self.terms {
            let mut coeff = c.clone();
            let mut kept = Vec::new();
            for (sym, exp) in m.powers() {
                match assignment.get(sym) {
                    Some(value) => coeff *= rational_pow(value, *exp),
                    None => kept.push((sym.clone(), *exp)),
                }
            }
            out.add_term(Monomial { powers: kept }, coeff);
        }
        out
    }
}

fn rational_pow(base: &BigRational, exp: u32) -> BigRational {
    let mut out = BigRational::one();
    for _ in 0..exp {
        out *= base;
    }
    out
}

/// Monic greatest common divisor of two polynomials.
///
/// Recursive in the variables: the smallest symbol occurring in either input is
/// taken as the main variable, contents (polynomials in the remaining symbols)
/// are handled by recursion and the primitive parts by a primitive
/// pseudo-remainder sequence.
pub fn gcd(a: &Polynomial, b: &Polynomial) -> Polynomial {
    if a.is_zero() {
        return b.monic();
    }
    if b.is_zero() {
        return a.monic();
    }
    if a.is_constant() || b.is_constant() {
        return Polynomial::one();
    }
    if a == b {
        return a.monic();
    }
    let var = match a.symbols().into_iter().chain(b.symbols()).min() {
        Some(var) => var,
        None => return Polynomial::one(),
    };
    if a.degree_in(&var) == 0 {
        return gcd(a, &b.content_in(&var));
    }
    if b.degree_in(&var) == 0 {
        return gcd(&a.content_in(&var), b);
    }

    let ca = a.content_in(&var);
    let cb = b.content_in(&var);
    let content = gcd(&ca, &cb);

    let mut p = a.exact_div(&ca).unwrap_or_else(|| a.clone());
    let mut q = b.exact_div(&cb).unwrap_or_else(|| b.clone());
    if p.degree_in(&var) < q.degree_in(&var) {
        std::mem::swap(&mut p, &mut q);
    }
    while !q.is_zero() {
        let r = p.pseudo_remainder(&q, &var);
        p = q;
        q = r.primitive_part_in(&var).monic();
    }
    (&p.primitive_part_in(&var) * &content).monic()
}

impl Add for &Polynomial {
    type Output = Polynomial;
    fn add(self, rhs: &Polynomial) -> Polynomial {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.add_term(m.clone(), c.clone());
        }
        out
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;
    fn sub(self, rhs: &Polynomial) -> Polynomial {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.add_term(m.clone(), -c.clone());
        }
        out
    }
}

impl Mul for &Polynomial {
    type Output = Polynomial;
    fn mul(self, rhs: &Polynomial) -> Polynomial {
        let mut out = Polynomial::zero();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &rhs.terms {
                out.add_term(ma.mul(mb), ca * cb);
            }
        }
        out
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;
    fn neg(self) -> Polynomial {
        Polynomial {
            terms: self
                .terms
                .iter()
                .map(|(m, c)| (m.clone(), -c.clone()))
                .collect(),
        }
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        for (idx, (m, c)) in self.terms.iter().rev().enumerate() {
            let negative = c.is_negative();
            match (idx, negative) {
                (0, true) => write!(f, "-")?,
                (0, false) => {}
                (_, true) => write!(f, " - ")?,
                (_, false) => write!(f, " + ")?,
            }
            let magnitude = c.abs();
            if m.is_one() {
                write!(f, "{magnitude}")?;
            } else if magnitude.is_one() {
                write!(f, "{m}")?;
            } else {
                write!(f, "{magnitude}*{m}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Polynomial {
        Polynomial::from_symbol(Symbol::new(name))
    }

    fn int(v: i64) -> Polynomial {
        Polynomial::constant(BigRational::from_integer(v.into()))
    }

    #[test]
    fn lex_order_prefers_smaller_symbols() {
        let x = Monomial::from_symbol(Symbol::new("x"), 1);
        let y3 = Monomial::from_symbol(Symbol::new("y"), 3);
        assert_eq!(x.lex_cmp(&y3), Ordering::Greater);
        assert_eq!(x.lex_cmp(&Monomial::one()), Ordering::Greater);
        let xy = x.mul(&y3);
        assert_eq!(xy.lex_cmp(&x), Ordering::Greater);
    }

    #[test]
    fn monomial_division_checks_all_exponents() {
        let x = Symbol::new("x");
        let y = Symbol::new("y");
        let x2y = Monomial::from_symbol(x.clone(), 2).mul(&Monomial::from_symbol(y.clone(), 1));
        let xy = Monomial::from_symbol(x.clone(), 1).mul(&Monomial::from_symbol(y.clone(), 1));
        assert_eq!(x2y.div(&xy), Some(Monomial::from_symbol(x.clone(), 1)));
        assert_eq!(xy.div(&x2y), None);
        assert_eq!(Monomial::from_symbol(x, 1).div(&Monomial::from_symbol(y, 1)), None);
    }

    #[test]
    fn arithmetic_cancels_terms() {
        let x = sym("x");
        let y = sym("y");
        let sum = &x + &y;
        let diff = &sum - &y;
        assert_eq!(diff, x);
        assert!((&x - &x).is_zero());
    }

    #[test]
    fn exact_division_recovers_factor() {
        let x = sym("x");
        let y = sym("y");
        let a = &(&x + &y) * &(&x - &int(2));
        let q = a.exact_div(&(&x + &y)).expect("x + y divides the product");
        assert_eq!(q, &x - &int(2));
        assert!(a.exact_div(&(&x + &int(1))).is_none());
    }

    #[test]
    fn gcd_of_multivariate_products() {
        let x = sym("x");
        let y = sym("y");
        let z = sym("z");
        let common = &(&x * &y) + &z;
        let a = &common * &(&x + &int(3));
        let b = &common * &(&y - &z);
        let g = gcd(&a, &b);
        assert_eq!(g, common.monic());
    }

    #[test]
    fn gcd_of_coprime_polynomials_is_one() {
        let x = sym("x");
        let y = sym("y");
        let g = gcd(&(&x + &y), &(&x - &y));
        assert!(g.is_one());
    }

    #[test]
    fn gcd_handles_powers_and_scaling() {
        let x = sym("x");
        let y = sym("y");
        let base = &x - &y;
        let a = base.pow(3).scale(&BigRational::from_integer(6.into()));
        let b = (&base.pow(2) * &(&x + &int(1))).scale(&BigRational::from_integer(4.into()));
        assert_eq!(gcd(&a, &b), base.pow(2).monic());
    }

    #[test]
    fn derivative_lowers_exponent() {
        let x = Symbol::new("x");
        let p = &Polynomial::from_symbol(x.clone()).pow(3) + &sym("y");
        let d = p.derivative(&x);
        assert_eq!(d, Polynomial::from_symbol(x).pow(2).scale(&BigRational::from_integer(3.into())));
    }

    #[test]
    fn display_formats_signs_and_powers() {
        let x = sym("x");
        let p = &(&x.pow(2) - &x.scale(&BigRational::new(1.into(), 2.into()))) + &int(-3);
        assert_eq!(p.to_string(), "x^2 - 1/2*x - 3");
        assert_eq!(Polynomial::zero().to_string(), "0");
    }

    #[test]
    fn partial_eval_keeps_unassigned_symbols() {
        let x = Symbol::new("x");
        let p = &(&sym("x") * &sym("y")) + &int(1);
        let mut assignment = BTreeMap::new();
        assignment.insert(x, BigRational::from_integer(2.into()));
        let partial = p.partial_eval(&assignment);
        assert_eq!(partial, &sym("y").scale(&BigRational::from_integer(2.into())) + &int(1));
        assert!(p.eval(&assignment).is_none());
    }
}
