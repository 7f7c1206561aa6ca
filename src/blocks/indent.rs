//! Indent adapter: builds a block tree from leading-whitespace nesting (§4.3).

use super::{AdapterResult, Block, BlockAdapter, BlockKind};

const FIXED_TAB_STOP: u32 = 8;
const DEFAULT_INDENT_WIDTH: u32 = 2;

pub struct IndentAdapter {
    /// Configured tab width; 0 means auto-detect (use the detected indent
    /// width itself, per spec §4.3).
    configured_tab_width: u32,
}

impl IndentAdapter {
    pub fn new(configured_tab_width: u32) -> Self {
        Self { configured_tab_width }
    }
}

/// Column position of the first non-whitespace character, expanding tabs to
/// the next multiple of `tab_stop`.
fn leading_columns(line: &str, tab_stop: u32) -> u32 {
    let mut col = 0u32;
    for c in line.chars() {
        match c {
            ' ' => col += 1,
            '\t' => {
                let stop = tab_stop.max(1);
                col = ((col / stop) + 1) * stop;
            }
            _ => break,
        }
    }
    col
}

/// Auto-detect the indentation step width: the most frequent positive
/// difference between consecutive non-blank leading-column counts,
/// preferring smaller values on ties, defaulting to 2.
fn detect_indent_width(lines: &[String]) -> u32 {
    let mut prev: Option<u32> = None;
    let mut freq: std::collections::HashMap<u32, u32> = std::collections::HashMap::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let col = leading_columns(line, FIXED_TAB_STOP);
        if let Some(p) = prev {
            let diff = col as i64 - p as i64;
            if diff > 0 {
                *freq.entry(diff as u32).or_insert(0) += 1;
            }
        }
        prev = Some(col);
    }
    freq.into_iter()
        .max_by(|(w1, c1), (w2, c2)| c1.cmp(c2).then(w2.cmp(w1)))
        .map(|(w, _)| w)
        .unwrap_or(DEFAULT_INDENT_WIDTH)
}

impl BlockAdapter for IndentAdapter {
    fn file_type(&self) -> &'static str {
        "indent"
    }

    fn build_blocks(&self, lines: &[String]) -> AdapterResult {
        let line_count = lines.len();
        if line_count == 0 {
            return AdapterResult { blocks: Vec::new(), block_idx_by_line: Vec::new() };
        }

        let indent_width = detect_indent_width(lines).max(1);
        let effective_tab_width = if self.configured_tab_width == 0 {
            indent_width
        } else {
            self.configured_tab_width
        };

        let mut blocks: Vec<Block> = Vec::new();
        // stack of block indices, innermost last
        let mut stack: Vec<usize> = Vec::new();
        let mut block_idx_by_line: Vec<usize> = vec![0; line_count];

        for (i, line) in lines.iter().enumerate() {
            let line_no = (i + 1) as u32;

            if line.trim().is_empty() {
                if let Some(&top) = stack.last() {
                    blocks[top].line_end = line_no;
                    block_idx_by_line[i] = top;
                } else {
                    // leading blank lines before any block opens: attach to a
                    // synthetic root once one exists; until then point at 0
                    // and fix up below once the first block opens.
                    block_idx_by_line[i] = usize::MAX;
                }
                continue;
            }

            let col = leading_columns(line, effective_tab_width);
            let level = col / indent_width;

            loop {
                match stack.last() {
                    None => {
                        let idx = blocks.len();
                        blocks.push(Block { kind: BlockKind::Layout, level, line_start: line_no, line_end: line_no, parent: None });
                        stack.push(idx);
                        break;
                    }
                    Some(&top) => {
                        let top_level = blocks[top].level;
                        if level > top_level {
                            let idx = blocks.len();
                            blocks.push(Block { kind: BlockKind::Layout, level, line_start: line_no, line_end: line_no, parent: Some(top) });
                            stack.push(idx);
                            break;
                        } else if level == top_level {
                            blocks[top].line_end = line_no;
                            break;
                        } else {
                            stack.pop();
                            continue;
                        }
                    }
                }
            }

            // Every block still open is an ancestor of this line, so its span
            // must grow to cover it too (containment invariant).
            for &idx in &stack {
                blocks[idx].line_end = blocks[idx].line_end.max(line_no);
            }

            let leaf = *stack.last().unwrap();
            block_idx_by_line[i] = leaf;
        }

        // At EOF, close every block still open on the stack (and thus every
        // ancestor of the last line) up to the true last line.
        let last_line = line_count as u32;
        for &idx in &stack {
            blocks[idx].line_end = blocks[idx].line_end.max(last_line);
        }

        // A file with no non-blank line never opens a block; synthesize one
        // root spanning the whole file so every line maps somewhere (mirrors
        // MarkdownAdapter's preamble block for headerless content).
        if blocks.is_empty() {
            blocks.push(Block { kind: BlockKind::Layout, level: 0, line_start: 1, line_end: last_line, parent: None });
            for slot in block_idx_by_line.iter_mut() {
                *slot = 0;
            }
            return AdapterResult { blocks, block_idx_by_line };
        }

        // Fix up any leading blank lines that had no open block yet.
        if let Some(first_real) = block_idx_by_line.iter().position(|&b| b != usize::MAX) {
            let fill_with = block_idx_by_line[first_real];
            for slot in block_idx_by_line.iter_mut().take(first_real) {
                *slot = fill_with;
                blocks[fill_with].line_start = blocks[fill_with].line_start.min(1);
            }
        }

        AdapterResult { blocks, block_idx_by_line }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::tests::assert_containment;

    fn lines(s: &str) -> Vec<String> {
        s.lines().map(|l| l.to_string()).collect()
    }

    #[test]
    fn scenario_module_with_two_defs() {
        // spec §8 scenario 3
        let src = lines("module X\n  def a\n    x = 1\n  def b\n    y = 2");
        let res = IndentAdapter::new(0).build_blocks(&src);
        assert_containment(&res.blocks);

        let root = res.blocks.iter().position(|b| b.parent.is_none()).unwrap();
        assert_eq!(res.blocks[root].line_start, 1);
        assert_eq!(res.blocks[root].line_end, 5);
        assert_eq!(res.blocks[root].level, 0);

        // same-level lines extend the open block rather than opening a
        // sibling (§4.3): `def a` and `def b` share one level-1 block.
        let defs = res.blocks.iter().position(|b| b.parent == Some(root)).unwrap();
        assert_eq!(res.blocks[defs].line_start, 2);
        assert_eq!(res.blocks[defs].line_end, 5);

        // block_of(5) is the level-2 block opened for `y = 2`, nested under
        // the merged level-1 block.
        let b5 = res.block_idx_by_line[4];
        assert_eq!(res.blocks[b5].line_start, 5);
        assert_eq!(res.blocks[b5].line_end, 5);
        assert_eq!(res.blocks[b5].parent, Some(defs));
    }

    #[test]
    fn detects_tab_indentation() {
        let src = lines("a\n\tb\n\tc\nd");
        let res = IndentAdapter::new(0).build_blocks(&src);
        assert_containment(&res.blocks);
        assert!(res.blocks.iter().any(|b| b.level == 1));
    }

    #[test]
    fn blank_lines_inherit_open_block() {
        let src = lines("a\n  b\n\n  c");
        let res = IndentAdapter::new(0).build_blocks(&src);
        let blank_block = res.block_idx_by_line[2];
        let b_block = res.block_idx_by_line[1];
        assert_eq!(blank_block, b_block);
    }

    #[test]
    fn between_levels_opens_new_block() {
        // closing from level 2 down to level 1 where no block at level 1
        // exists yet must open a fresh one rather than reusing level 0.
        let src = lines("a\n    b\n        c\n    d");
        let res = IndentAdapter::new(0).build_blocks(&src);
        assert_containment(&res.blocks);
    }

    #[test]
    fn empty_file_produces_no_blocks() {
        let res = IndentAdapter::new(0).build_blocks(&[]);
        assert!(res.blocks.is_empty());
        assert!(res.block_idx_by_line.is_empty());
    }

    #[test]
    fn all_blank_lines_synthesize_one_root_block() {
        let src = lines("\n   \n\t\n");
        let res = IndentAdapter::new(0).build_blocks(&src);
        assert_containment(&res.blocks);
        assert_eq!(res.blocks.len(), 1);
        assert_eq!(res.blocks[0].line_start, 1);
        assert_eq!(res.blocks[0].line_end, src.len() as u32);
        assert_eq!(res.block_idx_by_line.len(), src.len());
        assert!(res.block_idx_by_line.iter().all(|&b| b == 0));
    }

    #[test]
    fn level_monotonic_root_to_leaf() {
        let src = lines("a\n  b\n    c\n  d\ne");
        let res = IndentAdapter::new(0).build_blocks(&src);
        for b in &res.blocks {
            if let Some(p) = b.parent {
                assert!(res.blocks[p].level < b.level);
            }
        }
    }

    proptest::proptest! {
        #[test]
        fn containment_and_line_map_hold_for_any_indentation(
            steps in proptest::collection::vec(-2i32..=2, 1..60)
        ) {
            let mut depth = 0i32;
            let mut src = Vec::new();
            for step in steps {
                depth = (depth + step).clamp(0, 10);
                src.push(format!("{}x", " ".repeat((depth as usize) * 2)));
            }
            let res = IndentAdapter::new(0).build_blocks(&src);
            assert_containment(&res.blocks);
            proptest::prop_assert_eq!(res.block_idx_by_line.len(), src.len());
            for &idx in &res.block_idx_by_line {
                proptest::prop_assert!(idx < res.blocks.len());
            }
            for b in &res.blocks {
                if let Some(p) = b.parent {
                    proptest::prop_assert!(res.blocks[p].level < b.level);
                }
            }
        }
    }
}
