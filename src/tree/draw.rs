use std::fmt::{self, Write};

use itertools::Itertools;

use super::{NodeIndex, SlotTree};

impl<T> SlotTree<T> {
    /// Renders the tree with box-drawing connectors, one `index: payload` line
    /// per node, followed by a summary of the free list.
    ///
    /// The layout is meant for humans and may change.
    pub fn debug_draw(&self, mut node_display: impl FnMut(&T) -> String) -> String {
        let mut output = String::new();
        // writing into a String cannot fail
        let _ = self.draw(&mut output, &mut node_display);
        output
    }

    fn draw<W: Write, F: FnMut(&T) -> String>(
        &self,
        f: &mut W,
        node_display: &mut F,
    ) -> fmt::Result {
        match self.top_node() {
            None => writeln!(f, "[Tree is empty]")?,
            Some(top) => {
                writeln!(f, "{top}: {}", node_display(&self.slots.nodes[top.0].payload))?;
                self.draw_children(f, top, "", node_display)?;
            }
        }

        let free = &self.slots.free_list;
        let noun = if free.len() == 1 { "entry" } else { "entries" };
        write!(f, "{} {noun} on free list", free.len())?;
        if !free.is_empty() {
            write!(f, " - {}", free.iter().join(" "))?;
        }
        writeln!(f)
    }

    fn draw_children<W: Write, F: FnMut(&T) -> String>(
        &self,
        f: &mut W,
        node: NodeIndex,
        prefix: &str,
        node_display: &mut F,
    ) -> fmt::Result {
        let children = &self.slots.nodes[node.0].children;
        for (i, &child) in children.iter().enumerate() {
            let is_last_child = i + 1 == children.len();
            let connector = if is_last_child {
                "└── "
            } else {
                "├── "
            };
            writeln!(
                f,
                "{prefix}{connector}{child}: {}",
                node_display(&self.slots.nodes[child.0].payload)
            )?;

            let child_prefix = format!("{prefix}{}", if is_last_child { "    " } else { "│   " });
            self.draw_children(f, child, &child_prefix, node_display)?;
        }
        Ok(())
    }
}
