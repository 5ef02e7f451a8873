//! Sinks: terminal operations consuming pixels.
//!
//! [`BufferSink`] copies each chunk into a caller-owned [`Buffer`] as it is
//! rendered. [`PfmSink`] needs the whole image and writes it once as a
//! Portable Float Map.

use std::any::Any;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tessera_graph::prelude::*;
use tracing::{debug, info};

/// Streams rendered chunks into `target`.
#[derive(Debug, Clone)]
pub struct BufferSink {
    /// Destination; shares storage with the caller's handle.
    pub target: Buffer,
}

impl BufferSink {
    /// Sink writing into `target`.
    pub fn new(target: Buffer) -> Self {
        Self { target }
    }
}

impl Operation for BufferSink {
    fn name(&self) -> &str {
        "tessera:buffer-sink"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Sink
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        _output_pad: &str,
        result: &Rect,
        level: u32,
    ) -> Result<(), OperationError> {
        let format = self.target.format();
        let data = ctx.read_input("input", result, format)?;
        let r = ctx.level_rect(result);
        self.target
            .set_at_level(&r, level, format, &data, r.width as usize * format.components())?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Writes the whole input rectangle to a PFM file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfmSink {
    /// Output file.
    pub path: PathBuf,
}

impl PfmSink {
    /// Sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Writes packed RGB rows (top row first) of `width` x `height` as a
/// little-endian color PFM.
pub fn write_pfm(path: &Path, width: usize, height: usize, rgb: &[f32]) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write!(w, "PF\n{width} {height}\n-1.0\n")?;
    // PFM stores rows bottom to top.
    for row in rgb.chunks_exact(width * 3).take(height).rev() {
        for v in row {
            w.write_all(&v.to_le_bytes())?;
        }
    }
    w.flush()
}

impl Operation for PfmSink {
    fn name(&self) -> &str {
        "tessera:pfm-save"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Sink
    }

    fn needs_full(&self) -> bool {
        true
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        _output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), OperationError> {
        let rgb = ctx.read_input("input", result, Format::RGB_F32)?;
        let r = ctx.level_rect(result);
        debug!(path = %self.path.display(), %r, "writing pfm");
        write_pfm(&self.path, r.width as usize, r.height as usize, &rgb)
            .map_err(|e| OperationError::failed(format!("{}: {e}", self.path.display())))?;
        info!(path = %self.path.display(), width = r.width, height = r.height, "saved");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Checkerboard, Color};

    #[test]
    fn test_buffer_sink_streams() {
        let extent = Rect::new(0, 0, 20, 10);
        let target = Buffer::allocate(extent, Format::RGBA_F32);
        let mut g = Graph::new();
        let src = g.add_node(Color::new([0.25, 0.5, 0.75, 1.0]).with_extent(extent));
        let sink = g.add_node(BufferSink::new(target.clone()));
        g.link(src, sink).unwrap();

        let mut p = Processor::new(&g, sink, None).unwrap().with_chunk_size(50);
        while p.work(&g, None).unwrap() {}
        assert_eq!(p.mode(), tessera_graph::ProcessorMode::Streaming);
        let px = target.read(&Rect::new(19, 9, 1, 1), 0).unwrap();
        assert_eq!(px, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_pfm_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pfm");
        let mut g = Graph::new();
        let src = g.add_node(Checkerboard {
            extent: Rect::new(0, 0, 4, 2),
            ..Checkerboard::new(1)
        });
        let sink = g.add_node(PfmSink::new(&path));
        g.link(src, sink).unwrap();
        g.process(sink).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header = b"PF\n4 2\n-1.0\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(bytes.len(), header.len() + 4 * 2 * 3 * 4);
        // Last stored row is image row 0; its first pixel is color1.
        let last_row = header.len() + 4 * 3 * 4;
        let v = f32::from_le_bytes(bytes[last_row..last_row + 4].try_into().unwrap());
        assert_eq!(v, 0.4);
    }

    #[test]
    fn test_pfm_sink_bad_path_is_not_fatal() {
        let mut g = Graph::new();
        let src = g.add_node(Color::new([1.0; 4]).with_extent(Rect::new(0, 0, 2, 2)));
        let sink = g.add_node(PfmSink::new("/nonexistent-dir/x/out.pfm"));
        g.link(src, sink).unwrap();
        assert!(g.process(sink).is_ok());
    }

    #[test]
    fn test_unbounded_source_refused() {
        let target = Buffer::allocate(Rect::new(0, 0, 4, 4), Format::RGBA_F32);
        let mut g = Graph::new();
        let src = g.add_node(Color::new([1.0; 4]));
        let sink = g.add_node(BufferSink::new(target));
        g.link(src, sink).unwrap();
        assert!(matches!(
            g.process(sink),
            Err(tessera_graph::GraphError::Core(tessera_core::Error::InfiniteRect))
        ));
    }
}
