#[cfg(test)]
#[path = "project_tree_test.rs"]
mod tests;

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;
use uuid::Uuid;

use crate::domain::models::Node;
use crate::domain::models::NodeKind;

/// Read-only view over the node mapping held by a snapshot. Presentation
/// order comes from `parent_id` links, never from map iteration order.
pub struct ProjectTree<'a> {
    items: &'a HashMap<String, Arc<Node>>,
}

impl<'a> ProjectTree<'a> {
    pub fn new(items: &'a HashMap<String, Arc<Node>>) -> ProjectTree<'a> {
        return ProjectTree { items };
    }

    pub fn create_id() -> String {
        return Uuid::new_v4()
            .to_string()
            .split('-')
            .enumerate()
            .filter_map(|(idx, str)| {
                if idx > 1 {
                    return None;
                }
                return Some(str);
            })
            .collect::<Vec<&str>>()
            .join("-");
    }

    /// Fresh id that doesn't collide with any node, whatever its type.
    pub fn unused_id(&self) -> String {
        loop {
            let id = ProjectTree::create_id();
            if !self.items.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn is_folder(&self, id: &str) -> bool {
        return self
            .items
            .get(id)
            .map(|node| return node.kind() == NodeKind::Folder)
            .unwrap_or(false);
    }

    fn sorted(&self, mut nodes: Vec<&'a Arc<Node>>) -> Vec<&'a Arc<Node>> {
        nodes.sort_by(|a, b| {
            return a.name().cmp(b.name()).then_with(|| return a.id().cmp(b.id()));
        });

        return nodes;
    }

    pub fn children(&self, parent_id: Option<&str>) -> Vec<&'a Arc<Node>> {
        let nodes = self
            .items
            .values()
            .filter(|node| return node.parent_id() == parent_id)
            .collect::<Vec<&Arc<Node>>>();

        return self.sorted(nodes);
    }

    pub fn roots(&self) -> Vec<&'a Arc<Node>> {
        return self.children(None);
    }

    /// Parents of a node, closest first. Stops at a missing parent or a cycle.
    pub fn ancestors(&self, id: &str) -> Vec<&'a Arc<Node>> {
        let mut res: Vec<&Arc<Node>> = vec![];
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = self.items.get(id);

        while let Some(node) = current {
            if !seen.insert(node.id()) {
                break;
            }

            current = node.parent_id().and_then(|parent| return self.items.get(parent));
            if let Some(parent) = current {
                res.push(parent);
            }
        }

        return res;
    }

    /// Slash separated names from the root down to the node.
    pub fn path(&self, id: &str) -> String {
        let mut names = self
            .ancestors(id)
            .iter()
            .map(|node| return node.name().to_string())
            .collect::<Vec<String>>();
        names.reverse();

        if let Some(node) = self.items.get(id) {
            names.push(node.name().to_string());
        }

        return names.join("/");
    }

    pub fn validate(&self) -> Result<()> {
        for (key, node) in self.items.iter() {
            if key != node.id() {
                bail!(format!(
                    "Node {} is stored under mismatched key {key}",
                    node.id()
                ));
            }

            if let Some(parent_id) = node.parent_id() {
                if !self.items.contains_key(parent_id) {
                    bail!(format!(
                        "Node {key} references missing parent {parent_id}"
                    ));
                }
                if !self.is_folder(parent_id) {
                    bail!(format!("Node {key} has parent {parent_id} which is not a folder"));
                }
            }

            let mut seen: HashSet<&str> = HashSet::new();
            seen.insert(node.id());
            for ancestor in self.ancestors(key) {
                if !seen.insert(ancestor.id()) {
                    bail!(format!("Node {key} is part of a parent cycle"));
                }
            }
        }

        return Ok(());
    }

    /// Indented listing used by the CLI. The selected project is marked.
    pub fn render(&self, selected_id: Option<&str>) -> Vec<String> {
        let mut lines: Vec<String> = vec![];
        self.render_level(None, 0, selected_id, &mut lines);

        return lines;
    }

    fn render_level(
        &self,
        parent_id: Option<&str>,
        depth: usize,
        selected_id: Option<&str>,
        lines: &mut Vec<String>,
    ) {
        for node in self.children(parent_id) {
            let indent = "  ".repeat(depth);
            let marker = if Some(node.id()) == selected_id {
                "*"
            } else {
                "-"
            };

            match &**node {
                Node::Folder(folder) => {
                    lines.push(format!("{indent}{marker} {}/", folder.name));
                    self.render_level(Some(&folder.id), depth + 1, selected_id, lines);
                }
                Node::Project(project) => {
                    lines.push(format!(
                        "{indent}{marker} {} (ID: {}, components: {})",
                        project.name,
                        project.id,
                        project.components.len()
                    ));
                }
            }
        }
    }
}
