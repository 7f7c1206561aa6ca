//! Window adapter: fixed-size overlapping windows, the fallback for files
//! with no structural hints (§4.3).

use super::{AdapterResult, Block, BlockAdapter, BlockKind};

pub const DEFAULT_WINDOW_SIZE: u32 = 50;
pub const DEFAULT_WINDOW_OVERLAP: u32 = 10;

pub struct WindowAdapter {
    pub size: u32,
    pub overlap: u32,
}

impl Default for WindowAdapter {
    fn default() -> Self {
        Self { size: DEFAULT_WINDOW_SIZE, overlap: DEFAULT_WINDOW_OVERLAP }
    }
}

impl BlockAdapter for WindowAdapter {
    fn file_type(&self) -> &'static str {
        "window"
    }

    fn build_blocks(&self, lines: &[String]) -> AdapterResult {
        let line_count = lines.len() as u32;
        if line_count == 0 {
            return AdapterResult { blocks: Vec::new(), block_idx_by_line: Vec::new() };
        }

        let mut blocks = Vec::new();
        if line_count <= self.size {
            blocks.push(Block { kind: BlockKind::Window, level: 0, line_start: 1, line_end: line_count, parent: None });
        } else {
            let stride = self.size - self.overlap;
            let mut start = 1u32;
            loop {
                let end = (start + self.size - 1).min(line_count);
                blocks.push(Block { kind: BlockKind::Window, level: 0, line_start: start, line_end: end, parent: None });
                if end >= line_count {
                    break;
                }
                start += stride;
            }
        }

        // innermost containing block per line: for overlapping windows this
        // picks the first (earliest-starting) window that contains the line,
        // so each line maps to exactly one block deterministically.
        let mut block_idx_by_line = vec![0usize; line_count as usize];
        for (i, slot) in block_idx_by_line.iter_mut().enumerate() {
            let line_no = (i + 1) as u32;
            let idx = blocks.iter().position(|b| b.line_start <= line_no && line_no <= b.line_end).unwrap();
            *slot = idx;
        }

        AdapterResult { blocks, block_idx_by_line }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::tests::assert_containment;

    fn lines_of(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("line {i}")).collect()
    }

    #[test]
    fn small_file_single_block() {
        let res = WindowAdapter::default().build_blocks(&lines_of(30));
        assert_eq!(res.blocks.len(), 1);
        assert_eq!(res.blocks[0].line_end, 30);
    }

    #[test]
    fn large_file_overlapping_windows() {
        let res = WindowAdapter::default().build_blocks(&lines_of(120));
        assert_containment(&res.blocks);
        assert!(res.blocks.len() > 1);
        assert_eq!(res.blocks.last().unwrap().line_end, 120);
    }

    #[test]
    fn every_line_mapped() {
        let lines = lines_of(120);
        let res = WindowAdapter::default().build_blocks(&lines);
        assert_eq!(res.block_idx_by_line.len(), lines.len());
    }
}
