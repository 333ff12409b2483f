use std::fmt;
use std::sync::Arc;

/// A symbol together with its time-derivative order.
///
/// `x1` has order 0, `x1_dot` order 1, `x1_ddot` order 2 and `x1_d3`, `x1_d4`, ...
/// everything above. Parameters always have order 0.
///
/// Symbols order by name first and derivative order second, which is also the
/// variable order used by the lexicographic monomial ordering of
/// [`Polynomial`](crate::polynomial::Polynomial).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    name: Arc<str>,
    order: u32,
}

impl Symbol {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            order: 0,
        }
    }

    pub fn with_order(name: &str, order: u32) -> Self {
        Self {
            name: Arc::from(name),
            order,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// The symbol one derivative order higher (`x1` -> `x1_dot`).
    pub fn derivative(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            order: self.order + 1,
        }
    }

    /// The underlying order-0 symbol.
    pub fn base(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            order: 0,
        }
    }

    /// Splits an identifier like `x1_ddot` into `("x1", 2)`.
    ///
    /// Identifiers without a derivative suffix come back with order 0.
    pub fn split_derivative_suffix(ident: &str) -> (&str, u32) {
        if let Some(base) = ident.strip_suffix("_ddot") {
            if !base.is_empty() {
                return (base, 2);
            }
        }
        if let Some(base) = ident.strip_suffix("_dot") {
            if !base.is_empty() {
                return (base, 1);
            }
        }
        if let Some(pos) = ident.rfind("_d") {
            let (base, suffix) = ident.split_at(pos);
            let digits = &suffix[2..];
            if !base.is_empty() && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(order) = digits.parse::<u32>() {
                    return (base, order);
                }
            }
        }
        (ident, 0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order {
            0 => write!(f, "{}", self.name),
            1 => write!(f, "{}_dot", self.name),
            2 => write!(f, "{}_ddot", self.name),
            k => write!(f, "{}_d{}", self.name, k),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_dot_suffixes() {
        let x = Symbol::new("x1");
        assert_eq!(x.to_string(), "x1");
        assert_eq!(x.derivative().to_string(), "x1_dot");
        assert_eq!(x.derivative().derivative().to_string(), "x1_ddot");
        assert_eq!(Symbol::with_order("x1", 5).to_string(), "x1_d5");
    }

    #[test]
    fn split_suffix_round_trips_display() {
        for order in 0..6 {
            let sym = Symbol::with_order("y2", order);
            let text = sym.to_string();
            assert_eq!(Symbol::split_derivative_suffix(&text), ("y2", order));
        }
    }

    #[test]
    fn split_suffix_ignores_plain_underscores() {
        assert_eq!(Symbol::split_derivative_suffix("theta_dx"), ("theta_dx", 0));
        assert_eq!(Symbol::split_derivative_suffix("_dot"), ("_dot", 0));
        assert_eq!(Symbol::split_derivative_suffix("m_d"), ("m_d", 0));
    }

    #[test]
    fn ordering_is_by_name_then_order() {
        let a = Symbol::new("a");
        let a_dot = a.derivative();
        let b = Symbol::new("b");
        assert!(a < a_dot);
        assert!(a_dot < b);
        assert_eq!(a_dot.base(), a);
    }
}
