use crate::error::{FlatnessError, Result};
use crate::polynomial::Polynomial;
use crate::rational::RationalFunction;
use crate::symbol::Symbol;
use std::collections::BTreeSet;

/// The state vector of a model, its derivatives and its constant parameters.
///
/// Partial derivatives of the tangent system are taken with respect to the
/// symbols handed out here, and [`time_derivative`](Self::time_derivative)
/// applies the chain rule over every state symbol of every derivative order.
/// Any symbol that is not a state (declared parameters, ansatz coefficients)
/// is constant in time.
#[derive(Debug, Clone)]
pub struct DifferentiationContext {
    states: Vec<Symbol>,
    parameters: Vec<Symbol>,
}

impl DifferentiationContext {
    pub fn new<S, P>(states: &[S], parameters: &[P]) -> Result<Self>
    where
        S: AsRef<str>,
        P: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut check = |name: &str| -> Result<Symbol> {
            if !is_identifier(name) || Symbol::split_derivative_suffix(name).1 != 0 {
                return Err(FlatnessError::InvalidSymbol(name.to_string()));
            }
            if !seen.insert(name.to_string()) {
                return Err(FlatnessError::InvalidSymbol(format!("{name} (declared twice)")));
            }
            Ok(Symbol::new(name))
        };

        let states = states
            .iter()
            .map(|s| check(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let parameters = parameters
            .iter()
            .map(|p| check(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        if states.is_empty() {
            return Err(FlatnessError::InvalidSymbol("<empty state vector>".to_string()));
        }

        Ok(Self { states, parameters })
    }

    pub fn dimension(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> &[Symbol] {
        &self.states
    }

    pub fn parameters(&self) -> &[Symbol] {
        &self.parameters
    }

    /// `x^(order)`, e.g. order 1 gives the `ẋ` vector.
    pub fn state_derivatives(&self, order: u32) -> Vec<Symbol> {
        self.states
            .iter()
            .map(|s| Symbol::with_order(s.name(), order))
            .collect()
    }

    pub fn is_state(&self, symbol: &Symbol) -> bool {
        self.states.iter().any(|s| s.name() == symbol.name())
    }

    pub fn is_parameter(&self, symbol: &Symbol) -> bool {
        symbol.order() == 0 && self.parameters.iter().any(|p| p == symbol)
    }

    /// Maps an identifier such as `x1`, `x1_dot` or `k` to its symbol.
    pub fn resolve(&self, ident: &str) -> Option<Symbol> {
        if let Some(p) = self.parameters.iter().find(|p| p.name() == ident) {
            return Some(p.clone());
        }
        if let Some(s) = self.states.iter().find(|s| s.name() == ident) {
            return Some(s.clone());
        }
        let (base, order) = Symbol::split_derivative_suffix(ident);
        self.states
            .iter()
            .find(|s| s.name() == base)
            .map(|s| Symbol::with_order(s.name(), order))
    }

    /// A copy of this context with extra time-dependent symbols appended.
    pub fn with_additional_states<S: AsRef<str>>(&self, extra: &[S]) -> Result<Self> {
        let mut states: Vec<String> = self.states.iter().map(|s| s.name().to_string()).collect();
        states.extend(extra.iter().map(|s| s.as_ref().to_string()));
        let parameters: Vec<String> = self
            .parameters
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        Self::new(&states, &parameters)
    }

    pub fn time_derivative_polynomial(&self, p: &Polynomial) -> Polynomial {
        let mut out = Polynomial::zero();
        for symbol in p.symbols() {
            if !self.is_state(&symbol) {
                continue;
            }
            let partial = p.derivative(&symbol);
            out = &out + &(&partial * &Polynomial::from_symbol(symbol.derivative()));
        }
        out
    }

    /// Total time derivative; raises the derivative order of every state dependency by one.
    pub fn time_derivative(&self, f: &RationalFunction) -> RationalFunction {
        let num = f.numerator();
        let den = f.denominator();
        let dn = self.time_derivative_polynomial(num);
        let dd = self.time_derivative_polynomial(den);
        let result = if dd.is_zero() {
            RationalFunction::new(dn, den.clone())
        } else {
            RationalFunction::new(&(&dn * den) - &(num * &dd), den * den)
        };
        // The denominator of a valid rational function is never zero.
        result.unwrap_or_else(RationalFunction::zero)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}
