use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Graph structure for traversal and analysis.
///
/// Node ids are step ids; an edge `from -> to` means `from` must finish
/// before `to` starts. All lists are kept sorted so traversal is
/// deterministic.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: step_id -> list of downstream step_ids.
  adjacency: BTreeMap<String, Vec<String>>,
  /// Reverse adjacency: step_id -> list of upstream step_ids.
  reverse_adjacency: BTreeMap<String, Vec<String>>,
  /// Steps with no incoming edges.
  entry_points: Vec<String>,
  /// Steps with no outgoing edges.
  exit_points: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
  White,
  Gray,
  Black,
}

impl Graph {
  /// Build a graph from step ids and edges. Duplicate edges collapse.
  pub fn new(node_ids: &[String], edges: &[(String, String)]) -> Self {
    let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut reverse_adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    // Initialize all nodes
    for node_id in node_ids {
      adjacency.entry(node_id.clone()).or_default();
      reverse_adjacency.entry(node_id.clone()).or_default();
    }

    // Build adjacency lists
    for (from, to) in edges {
      adjacency.entry(from.clone()).or_default().insert(to.clone());
      reverse_adjacency
        .entry(to.clone())
        .or_default()
        .insert(from.clone());
    }

    let adjacency: BTreeMap<String, Vec<String>> = adjacency
      .into_iter()
      .map(|(k, v)| (k, v.into_iter().collect()))
      .collect();
    let reverse_adjacency: BTreeMap<String, Vec<String>> = reverse_adjacency
      .into_iter()
      .map(|(k, v)| (k, v.into_iter().collect()))
      .collect();

    let entry_points = reverse_adjacency
      .iter()
      .filter(|(_, incoming)| incoming.is_empty())
      .map(|(id, _)| id.clone())
      .collect();

    let exit_points = adjacency
      .iter()
      .filter(|(_, outgoing)| outgoing.is_empty())
      .map(|(id, _)| id.clone())
      .collect();

    Self {
      adjacency,
      reverse_adjacency,
      entry_points,
      exit_points,
    }
  }

  /// Get entry points (steps with no incoming edges).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get exit points (steps nothing depends on).
  pub fn exit_points(&self) -> &[String] {
    &self.exit_points
  }

  /// Get downstream steps for a given step.
  pub fn downstream(&self, step_id: &str) -> &[String] {
    self
      .adjacency
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream steps for a given step.
  pub fn upstream(&self, step_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Number of distinct predecessors.
  pub fn in_degree(&self, step_id: &str) -> usize {
    self.upstream(step_id).len()
  }

  /// In-degree of every step, the seed for scheduling.
  pub fn in_degrees(&self) -> HashMap<String, usize> {
    self
      .reverse_adjacency
      .iter()
      .map(|(id, incoming)| (id.clone(), incoming.len()))
      .collect()
  }

  /// Check if a step is a join point (has multiple incoming edges).
  pub fn is_join_point(&self, step_id: &str) -> bool {
    self.in_degree(step_id) > 1
  }

  pub fn node_ids(&self) -> impl Iterator<Item = &str> {
    self.adjacency.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.adjacency.len()
  }

  pub fn is_empty(&self) -> bool {
    self.adjacency.is_empty()
  }

  /// Find one cycle, if any, using white/gray/black depth-first colouring.
  ///
  /// The returned path starts and ends with the same step id. The walk keeps
  /// its own frame stack, so chain depth is not bounded by the thread stack.
  pub fn find_cycle(&self) -> Option<Vec<String>> {
    let mut colors: HashMap<&str, Color> = self
      .adjacency
      .keys()
      .map(|id| (id.as_str(), Color::White))
      .collect();

    for root in self.adjacency.keys() {
      if colors[root.as_str()] != Color::White {
        continue;
      }

      // (step, index of the next downstream step to look at)
      let mut frames: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
      colors.insert(root.as_str(), Color::Gray);

      while let Some(frame) = frames.last_mut() {
        let (id, child) = *frame;
        let Some(next) = self.downstream(id).get(child) else {
          colors.insert(id, Color::Black);
          frames.pop();
          continue;
        };
        frame.1 += 1;

        match colors.get(next.as_str()).copied().unwrap_or(Color::Black) {
          Color::Gray => {
            // the back edge closes a cycle starting at `next`
            let start = frames.iter().rposition(|(s, _)| *s == next.as_str())?;
            let mut path: Vec<String> = frames[start..].iter().map(|(s, _)| s.to_string()).collect();
            path.push(next.clone());
            return Some(path);
          }
          Color::White => {
            colors.insert(next.as_str(), Color::Gray);
            frames.push((next.as_str(), 0));
          }
          Color::Black => {}
        }
      }
    }
    None
  }

  /// Group steps into levels: every step's predecessors sit in earlier
  /// levels, and steps within a level are independent of each other.
  ///
  /// Returns `None` when the graph has a cycle.
  pub fn levels(&self) -> Option<Vec<Vec<String>>> {
    let mut in_degree = self.in_degrees();
    let mut current: Vec<String> = self.entry_points.clone();
    let mut levels = Vec::new();
    let mut seen = 0;

    while !current.is_empty() {
      seen += current.len();
      let mut next = BTreeSet::new();
      for id in &current {
        for down in self.downstream(id) {
          if let Some(degree) = in_degree.get_mut(down) {
            *degree -= 1;
            if *degree == 0 {
              next.insert(down.clone());
            }
          }
        }
      }
      levels.push(std::mem::take(&mut current));
      current = next.into_iter().collect();
    }

    (seen == self.len()).then_some(levels)
  }
}
