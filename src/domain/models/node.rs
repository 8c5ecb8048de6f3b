#[cfg(test)]
#[path = "node_test.rs"]
mod tests;

use anyhow::Result;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;

use super::ComponentConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Project,
    Folder,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl Project {
    pub fn new(id: &str, name: &str, parent_id: Option<&str>) -> Project {
        return Project {
            id: id.to_string(),
            name: name.to_string(),
            parent_id: parent_id.map(|e| return e.to_string()),
            components: vec![],
        };
    }

    pub fn component(&self, index: usize) -> Option<&ComponentConfig> {
        return self.components.get(index);
    }

    /// Copy of this project with a single component's payload swapped out.
    /// Returns `None` when the index is out of range.
    pub fn with_component_data(&self, index: usize, data: Value) -> Option<Project> {
        if index >= self.components.len() {
            return None;
        }

        let mut next = self.clone();
        next.components[index].data = data;

        return Some(next);
    }

    /// Structural snapshot of the project node as stored in a remote record.
    pub fn to_record_data(&self) -> Result<Value> {
        return Ok(serde_json::to_value(Node::Project(self.clone()))?);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Folder {
    pub fn new(id: &str, name: &str, parent_id: Option<&str>) -> Folder {
        return Folder {
            id: id.to_string(),
            name: name.to_string(),
            parent_id: parent_id.map(|e| return e.to_string()),
        };
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Project(Project),
    Folder(Folder),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Project(project) => return &project.id,
            Node::Folder(folder) => return &folder.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Project(project) => return &project.name,
            Node::Folder(folder) => return &folder.name,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Node::Project(project) => return project.parent_id.as_deref(),
            Node::Folder(folder) => return folder.parent_id.as_deref(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Project(_) => return NodeKind::Project,
            Node::Folder(_) => return NodeKind::Folder,
        }
    }

    pub fn as_project(&self) -> Option<&Project> {
        if let Node::Project(project) = self {
            return Some(project);
        }

        return None;
    }
}
