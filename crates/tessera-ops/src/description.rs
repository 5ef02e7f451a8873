//! YAML graph descriptions.
//!
//! A [`GraphSpec`] lists named nodes with typed operation parameters, the
//! links between them and the node to render.
//!
//! # Example
//!
//! ```
//! use tessera_graph::Graph;
//! use tessera_graph::Quality;
//! use tessera_ops::description::GraphSpec;
//!
//! let yaml = r#"
//! nodes:
//!   - name: bg
//!     op: { type: checkerboard, size: 8, extent: [0, 0, 64, 64] }
//!   - name: blur
//!     op: { type: box-blur, radius: 2 }
//! links:
//!   - { from: bg, to: blur }
//! output: blur
//! "#;
//! let spec = GraphSpec::from_yaml_str(yaml).unwrap();
//! let mut graph = Graph::new();
//! let built = spec.build(&mut graph, Quality::Good).unwrap();
//! assert_eq!(graph.bounding_box(built.output.unwrap()).width, 68);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_core::Rect;
use tessera_graph::{Graph, NodeId, Quality};
use tracing::debug;

use crate::area::BoxBlur;
use crate::compose::{Blend, BlendMode, MaskBlend};
use crate::error::{OpsError, OpsResult};
use crate::geometry::Crop;
use crate::meta::soft_glow;
use crate::point::{Invert, Multiply};
use crate::sink::PfmSink;
use crate::source::{Checkerboard, Color};
use crate::stats::Normalize;

fn default_pad() -> String {
    "input".to_string()
}

fn default_cell() -> i32 {
    16
}

fn default_gain() -> f32 {
    1.0
}

fn to_rect(r: &[i32; 4]) -> OpsResult<Rect> {
    if r[2] < 0 || r[3] < 0 {
        return Err(OpsError::invalid(format!("negative rect size {r:?}")));
    }
    Ok(Rect::new(r[0], r[1], r[2], r[3]))
}

/// Operation with its parameters. Rectangles are `[x, y, width, height]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OpSpec {
    /// Constant color.
    Color {
        /// RGBA.
        color: [f32; 4],
        /// Limits the color; infinite when absent.
        #[serde(default)]
        extent: Option<[i32; 4]>,
    },
    /// Two-color checkerboard.
    Checkerboard {
        /// Cell size in pixels.
        #[serde(default = "default_cell")]
        size: i32,
        /// First cell color.
        #[serde(default)]
        color1: Option<[f32; 4]>,
        /// Second cell color.
        #[serde(default)]
        color2: Option<[f32; 4]>,
        /// Limits the pattern; infinite when absent.
        #[serde(default)]
        extent: Option<[i32; 4]>,
    },
    /// Color inversion.
    Invert,
    /// Constant gain.
    Multiply {
        /// Gain.
        #[serde(default = "default_gain")]
        value: f32,
    },
    /// Box blur.
    BoxBlur {
        /// Radius in pixels.
        radius: i32,
    },
    /// Whole-image normalization.
    Normalize,
    /// Crop.
    Crop {
        /// Kept rectangle.
        rect: [i32; 4],
    },
    /// `aux` blended over `input`.
    Blend {
        /// Blend mode.
        #[serde(default)]
        mode: BlendMode,
    },
    /// `input` mixed towards `aux` through the `aux2` mask.
    MaskBlend,
    /// Soft-glow subgraph.
    SoftGlow {
        /// Blur radius.
        radius: i32,
        /// Glow gain.
        #[serde(default = "default_gain")]
        strength: f32,
    },
    /// PFM file writer.
    PfmSave {
        /// Output path.
        path: PathBuf,
    },
    /// Pass-through.
    Nop,
}

impl OpSpec {
    /// Adds the described operation to `graph`.
    ///
    /// `quality` picks between equivalent strategies where there is one.
    pub fn add_to(&self, graph: &mut Graph, name: &str, quality: Quality) -> OpsResult<NodeId> {
        let id = match self {
            Self::Color { color, extent } => {
                let mut op = Color::new(*color);
                if let Some(e) = extent {
                    op = op.with_extent(to_rect(e)?);
                }
                graph.add_named(name, op)
            }
            Self::Checkerboard {
                size,
                color1,
                color2,
                extent,
            } => {
                if *size < 1 {
                    return Err(OpsError::invalid(format!("checkerboard size {size}")));
                }
                let mut op = Checkerboard::new(*size);
                if let Some(c) = color1 {
                    op.color1 = *c;
                }
                if let Some(c) = color2 {
                    op.color2 = *c;
                }
                if let Some(e) = extent {
                    op.extent = to_rect(e)?;
                }
                graph.add_named(name, op)
            }
            Self::Invert => graph.add_named(name, Invert),
            Self::Multiply { value } => graph.add_named(name, Multiply::new(*value)),
            Self::BoxBlur { radius } => {
                if *radius < 0 {
                    return Err(OpsError::invalid(format!("blur radius {radius}")));
                }
                let op = match quality {
                    Quality::Reference => BoxBlur::direct(*radius),
                    _ => BoxBlur::new(*radius),
                };
                graph.add_named(name, op)
            }
            Self::Normalize => graph.add_named(name, Normalize),
            Self::Crop { rect } => graph.add_named(name, Crop::new(to_rect(rect)?)),
            Self::Blend { mode } => graph.add_named(name, Blend::new(*mode)),
            Self::MaskBlend => graph.add_named(name, MaskBlend),
            Self::SoftGlow { radius, strength } => {
                let id = soft_glow(graph, *radius, *strength)?;
                graph.set_name(id, name)?;
                id
            }
            Self::PfmSave { path } => graph.add_named(name, PfmSink::new(path.clone())),
            Self::Nop => graph.add_named(name, tessera_graph::Nop),
        };
        Ok(id)
    }
}

/// One named node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique name, used by links.
    pub name: String,
    /// Operation.
    pub op: OpSpec,
}

/// Connection of `from:output` to `to:pad`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Producer name.
    pub from: String,
    /// Consumer name.
    pub to: String,
    /// Consumer pad.
    #[serde(default = "default_pad")]
    pub pad: String,
}

/// Whole graph description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    /// Nodes in declaration order.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Connections.
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    /// Node to render.
    #[serde(default)]
    pub output: Option<String>,
}

/// Result of [`GraphSpec::build`].
#[derive(Debug, Clone, Default)]
pub struct BuiltGraph {
    /// Node ids by name.
    pub nodes: HashMap<String, NodeId>,
    /// The `output` node, if declared.
    pub output: Option<NodeId>,
}

impl BuiltGraph {
    /// Id of the node called `name`.
    pub fn node(&self, name: &str) -> OpsResult<NodeId> {
        self.nodes
            .get(name)
            .copied()
            .ok_or_else(|| OpsError::UnknownNode(name.to_string()))
    }
}

impl GraphSpec {
    /// Parses a YAML description.
    pub fn from_yaml_str(yaml: &str) -> OpsResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads a YAML description from `path`.
    pub fn from_file(path: impl AsRef<Path>) -> OpsResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Serializes back to YAML.
    pub fn to_yaml(&self) -> OpsResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Adds every node and link to `graph`.
    ///
    /// Names are checked before anything is added.
    pub fn build(&self, graph: &mut Graph, quality: Quality) -> OpsResult<BuiltGraph> {
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(OpsError::DuplicateNode(node.name.clone()));
            }
        }
        for link in &self.links {
            for name in [&link.from, &link.to] {
                if !seen.contains(name.as_str()) {
                    return Err(OpsError::UnknownNode(name.clone()));
                }
            }
        }
        if let Some(out) = &self.output {
            if !seen.contains(out.as_str()) {
                return Err(OpsError::UnknownNode(out.clone()));
            }
        }

        let mut built = BuiltGraph::default();
        for node in &self.nodes {
            let id = node.op.add_to(graph, &node.name, quality)?;
            built.nodes.insert(node.name.clone(), id);
        }
        for link in &self.links {
            let from = built.node(&link.from)?;
            let to = built.node(&link.to)?;
            graph.connect(from, "output", to, &link.pad)?;
        }
        built.output = self.output.as_deref().map(|n| built.node(n)).transpose()?;
        debug!(nodes = built.nodes.len(), links = self.links.len(), "graph built");
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
nodes:
  - name: bg
    op: { type: color, color: [0.2, 0.2, 0.2, 1.0], extent: [0, 0, 16, 16] }
  - name: fg
    op: { type: color, color: [1.0, 0.0, 0.0, 1.0], extent: [4, 4, 4, 4] }
  - name: over
    op: { type: blend, mode: screen }
links:
  - { from: bg, to: over }
  - { from: fg, to: over, pad: aux }
output: over
"#;

    #[test]
    fn test_parse_and_build() {
        let spec = GraphSpec::from_yaml_str(YAML).unwrap();
        assert_eq!(spec.nodes.len(), 3);
        assert_eq!(spec.links[0].pad, "input");
        assert_eq!(
            spec.nodes[2].op,
            OpSpec::Blend {
                mode: BlendMode::Screen
            }
        );

        let mut g = Graph::new();
        let built = spec.build(&mut g, Quality::Good).unwrap();
        let over = built.output.unwrap();
        assert_eq!(g.name(over), Some("over"));
        assert_eq!(g.bounding_box(over), Rect::new(0, 0, 16, 16));
        assert_eq!(g.detect(over, 5, 5), Some(built.node("fg").unwrap()));
    }

    #[test]
    fn test_unknown_link_target() {
        let spec = GraphSpec::from_yaml_str(
            "nodes:\n  - { name: a, op: { type: invert } }\nlinks:\n  - { from: a, to: b }\n",
        )
        .unwrap();
        let mut g = Graph::new();
        let err = spec.build(&mut g, Quality::Good).unwrap_err();
        assert!(matches!(err, OpsError::UnknownNode(ref n) if n == "b"));
        assert!(g.is_empty());
    }

    #[test]
    fn test_duplicate_names() {
        let spec = GraphSpec::from_yaml_str(
            "nodes:\n  - { name: a, op: { type: nop } }\n  - { name: a, op: { type: nop } }\n",
        )
        .unwrap();
        let err = spec.build(&mut Graph::new(), Quality::Good).unwrap_err();
        assert!(matches!(err, OpsError::DuplicateNode(_)));
    }

    #[test]
    fn test_bad_pad_is_graph_error() {
        let spec = GraphSpec::from_yaml_str(
            "nodes:\n  - { name: a, op: { type: invert } }\n  - { name: b, op: { type: invert } }\nlinks:\n  - { from: a, to: b, pad: aux }\n",
        )
        .unwrap();
        let err = spec.build(&mut Graph::new(), Quality::Good).unwrap_err();
        assert!(matches!(err, OpsError::Graph(_)));
    }

    #[test]
    fn test_reference_quality_blur() {
        let spec = GraphSpec::from_yaml_str("nodes:\n  - { name: b, op: { type: box-blur, radius: 3 } }\n").unwrap();
        let mut g = Graph::new();
        let built = spec.build(&mut g, Quality::Reference).unwrap();
        let blur = g.operation::<BoxBlur>(built.node("b").unwrap()).unwrap();
        assert_eq!(blur.method, crate::area::BlurMethod::Direct);
    }

    #[test]
    fn test_from_file_and_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let spec = GraphSpec::from_file(file.path()).unwrap();
        let again = GraphSpec::from_yaml_str(&spec.to_yaml().unwrap()).unwrap();
        assert_eq!(spec, again);
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            GraphSpec::from_yaml_str("nodes: [ { name: a, op: { type: warp } } ]"),
            Err(OpsError::Yaml(_))
        ));
    }
}
