//! Resolution of relation chains into the forward and reverse indexes.
//!
//! For every form with at least one relation, each of its top-level
//! relations is walked depth-first until the chain bottoms out or revisits
//! a hop already on the current path. The last hop's root is the chain's
//! final root: every hop lands in the final root's [`WordTree`] set and
//! every hop's form is linked to the final root in the [`ReverseIndex`].

use ahash::{AHashMap, AHashSet};
use log::info;

use crate::tree::{RelationTable, ReverseIndex, Triple, WordTree};

/// Progress log interval, in starting forms.
const PROGRESS_INTERVAL: usize = 100_000;

/// Builds a [`WordTree`] and [`ReverseIndex`] from a relation table.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    tree: AHashMap<String, AHashSet<Triple>>,
    reverse: ReverseIndex,
}

impl TreeBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        TreeBuilder::default()
    }

    /// Resolve every relation chain in `relations`.
    ///
    /// Starting forms are visited in sorted order so repeated builds over
    /// the same table produce identical structures.
    pub fn build(mut self, relations: &RelationTable) -> (WordTree, ReverseIndex) {
        let mut forms: Vec<&String> = relations.keys().collect();
        forms.sort_unstable();

        for (index, form) in forms.iter().enumerate() {
            if index > 0 && index % PROGRESS_INTERVAL == 0 {
                info!("building word tree: {index} forms resolved, at {form}...");
            }
            self.resolve_form(form.as_str(), relations);
        }

        let mut tree = AHashMap::with_capacity(self.tree.len());
        for (root, triples) in self.tree {
            let mut triples: Vec<Triple> = triples.into_iter().collect();
            triples.sort_unstable();
            tree.insert(root, triples);
        }
        (WordTree::from_map(tree), self.reverse)
    }

    /// Walk each top-level relation of `form` with a fresh path.
    fn resolve_form(&mut self, form: &str, relations: &RelationTable) {
        let Some(rels) = relations.get(form) else {
            return;
        };

        for rel in rels {
            let path = walk_chain(form, &rel.root, &rel.tag, relations);
            let Some(last) = path.last() else {
                continue;
            };
            let final_root = last.root.clone();

            let set = self.tree.entry(final_root.clone()).or_default();
            for hop in path {
                self.reverse.add(&hop.form, &final_root);
                set.insert(hop);
            }
        }
    }
}

/// Preorder depth-first walk of one relation chain, using an explicit work
/// stack so pathological chains cannot exhaust the call stack.
///
/// The returned path lists hops in visit order. A hop already on the path is
/// never re-entered (cycle guard), and relations tagged as plurals are not
/// chased past depth 0: regular plural inflection explodes combinatorially
/// without adding lexical information.
fn walk_chain(form: &str, root: &str, tag: &str, relations: &RelationTable) -> Vec<Triple> {
    let mut path: Vec<Triple> = Vec::new();
    let mut stack: Vec<(Triple, usize)> = vec![(
        Triple {
            form: form.to_string(),
            tag: tag.to_string(),
            root: root.to_string(),
        },
        0,
    )];

    while let Some((hop, depth)) = stack.pop() {
        if depth > 0 && hop.tag.contains("plural") {
            continue;
        }
        if path.contains(&hop) {
            continue;
        }

        // Push children reversed so the stack pops them in relation order.
        if let Some(next) = relations.get(&hop.root) {
            for rel in next.iter().rev() {
                stack.push((
                    Triple {
                        form: hop.root.clone(),
                        tag: rel.tag.clone(),
                        root: rel.root.clone(),
                    },
                    depth + 1,
                ));
            }
        }
        path.push(hop);
    }

    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Relation;

    fn relations(entries: &[(&str, &[(&str, &str)])]) -> RelationTable {
        let mut table = RelationTable::default();
        for (form, rels) in entries {
            table.insert(
                form.to_string(),
                rels.iter()
                    .map(|(root, tag)| Relation {
                        root: root.to_string(),
                        tag: tag.to_string(),
                    })
                    .collect(),
            );
        }
        table
    }

    #[test]
    fn test_simple_chain_resolves_to_final_root() {
        // corriendo -> correr (one hop).
        let table = relations(&[("corriendo", &[("correr", "gerund of")])]);
        let (tree, reverse) = TreeBuilder::new().build(&table);

        let triples = tree.get("correr").unwrap();
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].form, "corriendo");
        assert_eq!(reverse.get("corriendo").unwrap(), &["correr".to_string()]);
    }

    #[test]
    fn test_transitive_chain() {
        // c -> b -> a: both hops land under a.
        let table = relations(&[
            ("c", &[("b", "form of")]),
            ("b", &[("a", "form of")]),
        ]);
        let (tree, reverse) = TreeBuilder::new().build(&table);

        let triples = tree.get("a").unwrap();
        assert_eq!(triples.len(), 2);
        assert_eq!(reverse.get("c").unwrap(), &["a".to_string()]);
        assert_eq!(reverse.get("b").unwrap(), &["a".to_string()]);
        assert!(tree.get("b").is_none());
    }

    #[test]
    fn test_cycle_terminates() {
        let table = relations(&[
            ("ciclo-a", &[("ciclo-b", "form of")]),
            ("ciclo-b", &[("ciclo-a", "form of")]),
        ]);
        let (tree, reverse) = TreeBuilder::new().build(&table);

        // Both walks terminate; each triple appears at most once per root.
        for root in ["ciclo-a", "ciclo-b"] {
            if let Some(triples) = tree.get(root) {
                let mut seen = AHashSet::new();
                for t in triples {
                    assert!(seen.insert(t.clone()), "duplicate triple under {root}");
                }
            }
        }
        assert!(reverse.get("ciclo-a").is_some());
        assert!(reverse.get("ciclo-b").is_some());
    }

    #[test]
    fn test_plural_not_chased_past_depth_zero() {
        // gatitos -> gatito (plural, depth 0: kept)
        // gatito -> gato (diminutive, depth 1: kept)
        // gato -> gatos would only be reachable through a plural at depth > 0.
        let table = relations(&[
            ("gatitos", &[("gatito", "plural of")]),
            ("gatito", &[("gato", "diminutive of")]),
            ("gato", &[("gatos", "plural of")]),
        ]);
        let (tree, _) = TreeBuilder::new().build(&table);

        // The gatitos walk keeps its own plural hop but stops chasing the
        // deeper plural relation from gato.
        let triples = tree.get("gato").unwrap();
        assert!(triples.iter().any(|t| t.form == "gatitos"));
        assert!(triples.iter().any(|t| t.form == "gatito"));
        assert!(!triples.iter().any(|t| t.form == "gato"));
    }

    #[test]
    fn test_ambiguous_form_keeps_both_roots() {
        // fuera is a form of both ser and ir.
        let table = relations(&[(
            "fuera",
            &[("ser", "imperfect subjunctive of"), ("ir", "imperfect subjunctive of")],
        )]);
        let (tree, reverse) = TreeBuilder::new().build(&table);

        assert!(tree.get("ser").is_some());
        assert!(tree.get("ir").is_some());
        assert_eq!(
            reverse.get("fuera").unwrap(),
            &["ser".to_string(), "ir".to_string()]
        );
    }

    #[test]
    fn test_rebuild_is_identical() {
        let table = relations(&[
            ("c", &[("b", "form of")]),
            ("b", &[("a", "form of")]),
            ("x", &[("a", "form of"), ("b", "alternative form of")]),
        ]);
        let (tree1, rev1) = TreeBuilder::new().build(&table);
        let (tree2, rev2) = TreeBuilder::new().build(&table);
        assert_eq!(tree1, tree2);
        assert_eq!(rev1, rev2);
    }
}
