//! Diagnostic tree dump.

use std::fmt::Display;
use std::io;

use seize::LocalGuard;

use crate::node::Node;
use crate::nodeversion::VersionCapsule;

use super::FourTree;

const BRANCH: &str = "├── ";
const LAST: &str = "└── ";
const PIPE: &str = "│   ";
const SPACE: &str = "    ";

impl<V: Display, const WIDTH: usize, const WORDS: usize, C: VersionCapsule>
    FourTree<V, WIDTH, WORDS, C>
{
    /// Write one line per node to `sink`, depth-first, children in link
    /// order.
    ///
    /// ```text
    /// └── C(0)= 0:(b:2); 1:(d:4); 2:(f:6);
    ///     ├── C(0)= 0:(a:1); 1:(null:null); 2:(null:null);
    ///     └── C(3)= 0:(g:7); 1:(null:null); 2:(null:null);
    /// ```
    ///
    /// `C(i)` is the child link index under the parent (0 for the root).
    /// Keys print with trailing padding trimmed and non-printable bytes
    /// escaped. Not a consistent snapshot under concurrent writes.
    ///
    /// # Errors
    /// Any error from `sink`.
    pub fn print<W: io::Write>(&self, sink: &mut W) -> io::Result<()> {
        let guard: LocalGuard<'_> = self.guard();

        // (node, prefix, has later siblings, link index)
        let mut stack: Vec<(&Node<V, WIDTH, WORDS, C>, String, bool, usize)> =
            vec![(self.root(), String::new(), false, 0)];

        while let Some((node, prefix, is_branch, link)) = stack.pop() {
            write!(sink, "{prefix}{}C({link})= ", if is_branch { BRANCH } else { LAST })?;

            for slot in 0..WIDTH {
                match (node.key_at(slot), node.load_value(slot, &guard)) {
                    (Some(key), Some(value)) => {
                        write!(sink, "{slot}:({}:{value}); ", key.printable())?;
                    }
                    _ => write!(sink, "{slot}:(null:null); ")?,
                }
            }
            writeln!(sink)?;

            let child_prefix: String = format!("{prefix}{}", if is_branch { PIPE } else { SPACE });

            // Reverse so link 0 pops first.
            for child_link in (0..=WIDTH).rev() {
                let child: *mut Node<V, WIDTH, WORDS, C> = node.child(child_link);
                if !child.is_null() {
                    // SAFETY: non-null links target nodes that are freed only
                    // when the tree drops.
                    stack.push((
                        unsafe { &*child },
                        child_prefix.clone(),
                        child_link != WIDTH,
                        child_link,
                    ));
                }
            }
        }

        Ok(())
    }
}
