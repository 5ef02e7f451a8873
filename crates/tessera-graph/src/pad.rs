//! Named connection points on nodes.
//!
//! Every operation declares its pads when it is attached to a node. An input
//! pad holds at most one connection; an output pad fans out to any number of
//! consumers.

use std::fmt;

use crate::node::NodeId;

/// Direction of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// Consumes data.
    Input,
    /// Produces data.
    Output,
}

impl PadDirection {
    /// Lowercase name used in diagnostics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for PadDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a pad.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PadSpec {
    /// Pad name, unique per node.
    pub name: String,
    /// Pad direction.
    pub direction: PadDirection,
}

impl PadSpec {
    /// Declares an input pad.
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PadDirection::Input,
        }
    }

    /// Declares an output pad.
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PadDirection::Output,
        }
    }

    /// Returns `true` for input pads.
    pub fn is_input(&self) -> bool {
        self.direction == PadDirection::Input
    }

    /// Returns `true` for output pads.
    pub fn is_output(&self) -> bool {
        self.direction == PadDirection::Output
    }
}

/// One end of an edge: a node and one of its pads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Node owning the pad.
    pub node: NodeId,
    /// Pad name.
    pub pad: String,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(node: NodeId, pad: impl Into<String>) -> Self {
        Self {
            node,
            pad: pad.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.pad)
    }
}

/// A pad attached to a node, with its connections.
#[derive(Debug, Clone)]
pub(crate) struct Pad {
    pub(crate) spec: PadSpec,
    /// Source of an input pad.
    pub(crate) connection: Option<Endpoint>,
    /// Consumers of an output pad.
    pub(crate) targets: Vec<Endpoint>,
}

impl Pad {
    pub(crate) fn new(spec: PadSpec) -> Self {
        Self {
            spec,
            connection: None,
            targets: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn name(&self) -> &str {
        &self.spec.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_spec() {
        let p = PadSpec::input("aux");
        assert!(p.is_input());
        assert!(!p.is_output());
        assert_eq!(PadSpec::output("output").direction.to_string(), "output");
    }

    #[test]
    fn test_endpoint_display() {
        let e = Endpoint::new(NodeId::from_raw_parts(4, 1), "input");
        assert_eq!(e.to_string(), "#4.1:input");
    }
}
