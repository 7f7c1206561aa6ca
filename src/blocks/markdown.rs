//! Markdown adapter: blocks from ATX headings (§4.3).

use super::{AdapterResult, Block, BlockAdapter, BlockKind};
use regex::Regex;
use std::sync::OnceLock;

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.*)$").unwrap())
}

pub struct MarkdownAdapter;

impl BlockAdapter for MarkdownAdapter {
    fn file_type(&self) -> &'static str {
        "markdown"
    }

    fn build_blocks(&self, lines: &[String]) -> AdapterResult {
        let line_count = lines.len();
        if line_count == 0 {
            return AdapterResult { blocks: Vec::new(), block_idx_by_line: Vec::new() };
        }

        // headings: (line_no, level)
        let headings: Vec<(u32, u32)> = lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| heading_re().captures(l).map(|c| ((i + 1) as u32, c[1].len() as u32)))
            .collect();

        let mut blocks: Vec<Block> = Vec::new();
        let mut block_idx_by_line: Vec<usize> = vec![0; line_count];

        // Preamble block (level 0) if content precedes the first heading.
        let preamble_end = headings.first().map(|(ln, _)| ln - 1).unwrap_or(line_count as u32);
        let mut open_stack: Vec<usize> = Vec::new();
        if preamble_end >= 1 {
            let idx = blocks.len();
            blocks.push(Block { kind: BlockKind::Heading, level: 0, line_start: 1, line_end: preamble_end, parent: None });
            for slot in block_idx_by_line.iter_mut().take(preamble_end as usize) {
                *slot = idx;
            }
        }

        for (hi, &(start, level)) in headings.iter().enumerate() {
            // end = line before the next heading of level <= this one, else EOF
            let end = headings[hi + 1..]
                .iter()
                .find(|(_, l2)| *l2 <= level)
                .map(|(ln2, _)| ln2 - 1)
                .unwrap_or(line_count as u32);

            while let Some(&top) = open_stack.last() {
                if blocks[top].level >= level {
                    open_stack.pop();
                } else {
                    break;
                }
            }
            let parent = open_stack.last().copied();
            let idx = blocks.len();
            blocks.push(Block { kind: BlockKind::Heading, level, line_start: start, line_end: end, parent });
            open_stack.push(idx);

            for slot in block_idx_by_line.iter_mut().take(end as usize).skip((start - 1) as usize) {
                *slot = idx;
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
    fn nested_headings() {
        let src = lines("# Title\nintro\n## Sub\nbody\n### Leaf\nmore\n## Sub2\nend");
        let res = MarkdownAdapter.build_blocks(&src);
        assert_containment(&res.blocks);
        // Title (level 1) spans through the end since Sub2 is level 2 < 1? no level1 closes only at next level<=1
        let title = res.blocks.iter().find(|b| b.level == 1).unwrap();
        assert_eq!(title.line_start, 1);
        assert_eq!(title.line_end, 8);
    }

    #[test]
    fn preamble_before_first_heading() {
        let src = lines("intro text\nmore intro\n# Heading\nbody");
        let res = MarkdownAdapter.build_blocks(&src);
        let preamble = res.blocks.iter().find(|b| b.level == 0).unwrap();
        assert_eq!(preamble.line_start, 1);
        assert_eq!(preamble.line_end, 2);
    }

    #[test]
    fn sibling_headings_disjoint() {
        let src = lines("## A\nbody a\n## B\nbody b");
        let res = MarkdownAdapter.build_blocks(&src);
        assert_containment(&res.blocks);
        let a = &res.blocks[0];
        let b = &res.blocks[1];
        assert!(a.line_end < b.line_start);
    }

    #[test]
    fn no_headings_is_single_preamble() {
        let src = lines("just text\nno headings here");
        let res = MarkdownAdapter.build_blocks(&src);
        assert_eq!(res.blocks.len(), 1);
        assert_eq!(res.blocks[0].level, 0);
    }
}
