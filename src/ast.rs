//! Syntax tree produced by the filter parser.

use std::fmt;

/// Comparison operator of a single filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Equal,              // ==
    NotEqual,           // !=
    GreaterThan,        // >
    GreaterThanOrEqual, // >=
    LessThan,           // <
    LessThanOrEqual,    // <=
    In,                 // |=
    Contains,           // -=-
    StartsWith,         // =-
    EndsWith,           // -=
}

impl FilterOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "==" => FilterOperator::Equal,
            "!=" => FilterOperator::NotEqual,
            ">" => FilterOperator::GreaterThan,
            ">=" => FilterOperator::GreaterThanOrEqual,
            "<" => FilterOperator::LessThan,
            "<=" => FilterOperator::LessThanOrEqual,
            "|=" => FilterOperator::In,
            "-=-" => FilterOperator::Contains,
            "=-" => FilterOperator::StartsWith,
            "-=" => FilterOperator::EndsWith,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            FilterOperator::Equal => "==",
            FilterOperator::NotEqual => "!=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::In => "|=",
            FilterOperator::Contains => "-=-",
            FilterOperator::StartsWith => "=-",
            FilterOperator::EndsWith => "-=",
        }
    }

    /// Operators that only make sense on text fields.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Collection quantifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quantifier {
    /// At least one element matches.
    #[default]
    Any,
    /// Every element matches.
    All,
}

/// A node of the filter tree. Children are owned exclusively by their parent.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Leaf comparison, e.g. `!name=-*'jo'`.
    Filter {
        property: String,
        operator: FilterOperator,
        /// `None` stands for the `null` literal.
        values: Vec<Option<String>>,
        negated: bool,
        case_insensitive: bool,
    },
    /// Quantified filter over a sequence field, e.g. `items*(price>10)`.
    Collection {
        property: String,
        inner: Box<Node>,
        quantifier: Quantifier,
        negated: bool,
    },
    /// `negated` applies to the combined result, never to the children.
    AndAlso {
        left: Box<Node>,
        right: Box<Node>,
        negated: bool,
    },
    OrElse {
        left: Box<Node>,
        right: Box<Node>,
        negated: bool,
    },
}

impl Node {
    pub fn and_also(left: Node, right: Node) -> Self {
        Node::AndAlso {
            left: Box::new(left),
            right: Box::new(right),
            negated: false,
        }
    }

    pub fn or_else(left: Node, right: Node) -> Self {
        Node::OrElse {
            left: Box::new(left),
            right: Box::new(right),
            negated: false,
        }
    }

    pub fn is_negated(&self) -> bool {
        match self {
            Node::Filter { negated, .. }
            | Node::Collection { negated, .. }
            | Node::AndAlso { negated, .. }
            | Node::OrElse { negated, .. } => *negated,
        }
    }

    /// Toggles the node's own negation flag. Children are left untouched.
    pub fn negated(mut self) -> Self {
        match &mut self {
            Node::Filter { negated, .. }
            | Node::Collection { negated, .. }
            | Node::AndAlso { negated, .. }
            | Node::OrElse { negated, .. } => *negated = !*negated,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_symbols_round_trip() {
        for symbol in ["==", "!=", ">", ">=", "<", "<=", "|=", "-=-", "=-", "-="] {
            let op = FilterOperator::from_symbol(symbol).unwrap();
            assert_eq!(op.symbol(), symbol);
        }
        assert_eq!(FilterOperator::from_symbol("="), None);
    }

    #[test]
    fn test_negation_toggles_only_the_combined_node() {
        let leaf = Node::Filter {
            property: "a".into(),
            operator: FilterOperator::Equal,
            values: vec![Some("1".into())],
            negated: false,
            case_insensitive: false,
        };
        let node = Node::or_else(leaf.clone(), leaf.clone()).negated();

        assert!(node.is_negated());
        if let Node::OrElse { left, right, .. } = &node {
            assert!(!left.is_negated());
            assert!(!right.is_negated());
        } else {
            panic!("Expected OrElse node");
        }
        assert!(!node.negated().is_negated());
    }
}
