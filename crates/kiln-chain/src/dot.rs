//! Graphviz rendering of a build chain.

use std::fmt::Write;

use crate::chain::BuildChain;

impl BuildChain {
  /// Render the chain as a Graphviz `digraph`.
  ///
  /// Entry points share the first rank and exit points the last; each edge
  /// is labelled with the items that induce it.
  pub fn to_dot(&self) -> String {
    let mut out = String::new();
    let graph = self.graph();

    // writing into a String cannot fail
    let _ = writeln!(out, "digraph {{");
    let _ = writeln!(out, "    node [shape=rectangle];");
    let _ = writeln!(out, "    rankdir=LR;");
    let _ = writeln!(out);

    let _ = write!(out, "    {{ rank = same; ");
    for id in graph.entry_points() {
      let _ = write!(out, "{}; ", quote(id));
    }
    let _ = writeln!(out, "}};");

    let _ = write!(out, "    {{ rank = same; ");
    for id in graph.exit_points() {
      if !graph.entry_points().contains(id) {
        let _ = write!(out, "{}; ", quote(id));
      }
    }
    let _ = writeln!(out, "}};");
    let _ = writeln!(out);

    for edge in self.edges() {
      let _ = writeln!(
        out,
        "    {} -> {} [label={}];",
        quote(&edge.from),
        quote(&edge.to),
        quote(&edge.items.join("\\n"))
      );
    }

    let _ = writeln!(out, "}}");
    out
  }
}

fn quote(input: &str) -> String {
  format!("\"{}\"", input.replace('"', "\\\""))
}
