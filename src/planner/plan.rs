//! Compiled plans

use bson::Bson;
use serde::Serialize;

use super::command::{Command, Verb};

/// Strategy chosen for a SELECT
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SelectShape {
    /// `distinct` command; values come back as rows keyed by `output`
    Distinct { output: String },
    /// single `find`
    Find,
    /// `$lookup` + `$unwind` pipeline
    JoinOnly,
    /// `$group` + `$replaceRoot` pipeline
    Grouping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanShape {
    Select(SelectShape),
    Insert,
    Update,
    Delete,
    /// CREATE / ALTER / DROP
    Definition,
}

/// Column whose next key is sampled before the insert runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoIncrementSlot {
    pub collection: String,
    pub column: String,
}

/// Where a SELECT's column types are sampled from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProbeTarget {
    pub collection: String,
    /// Every explicitly selected column; empty for `SELECT *`
    pub columns: Vec<ProbeColumn>,
    pub join: Option<JoinedCollection>,
}

/// One selected column: its key in result documents and the field sampled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeColumn {
    pub key: String,
    pub source: String,
    /// Sampled from the joined collection rather than the base one
    pub joined: bool,
}

impl ProbeColumn {
    pub fn base(key: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
            joined: false,
        }
    }

    pub fn joined(key: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
            joined: true,
        }
    }
}

/// Collection embedded under a join prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinedCollection {
    pub collection: String,
    pub prefix: String,
}

/// Output of planning one statement.
///
/// Carries no runtime state; executing the same plan twice issues the same
/// commands (apart from the auto-increment substitution).
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub statement: &'static str,
    pub shape: PlanShape,
    pub commands: Vec<Command>,
    pub auto_increment: Option<AutoIncrementSlot>,
    pub probe: Option<ProbeTarget>,
}

impl Plan {
    pub fn new(statement: &'static str, shape: PlanShape) -> Self {
        Self {
            statement,
            shape,
            commands: Vec::new(),
            auto_increment: None,
            probe: None,
        }
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands.extend(commands);
        self
    }

    pub fn with_auto_increment(mut self, slot: AutoIncrementSlot) -> Self {
        self.auto_increment = Some(slot);
        self
    }

    pub fn with_probe(mut self, probe: ProbeTarget) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn is_select(&self) -> bool {
        matches!(self.shape, PlanShape::Select(_))
    }

    pub fn verbs(&self) -> Vec<Verb> {
        self.commands.iter().map(Command::verb).collect()
    }

    /// Relaxed extended JSON rendering of the plan
    pub fn explain(&self) -> serde_json::Value {
        let commands: Vec<serde_json::Value> = self
            .commands
            .iter()
            .map(|c| Bson::Document(c.document().clone()).into_relaxed_extjson())
            .collect();
        serde_json::json!({
            "statement": self.statement,
            "shape": self.shape,
            "auto_increment": self.auto_increment,
            "commands": commands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_explain_renders_commands() {
        let plan = Plan::new("select", PlanShape::Select(SelectShape::Find)).with_command(
            Command::new(Verb::Find, "users").with("projection", doc! { "_id": 0 }),
        );
        let explained = plan.explain();
        assert_eq!(explained["statement"], "select");
        assert_eq!(explained["shape"]["kind"], "select");
        assert_eq!(explained["shape"]["strategy"], "find");
        assert_eq!(explained["commands"][0]["find"], "users");
        assert_eq!(explained["commands"][0]["projection"]["_id"], 0);
    }

    #[test]
    fn test_verbs_in_order() {
        let plan = Plan::new("create", PlanShape::Definition)
            .with_command(Command::new(Verb::Create, "users"))
            .with_command(Command::new(Verb::CreateIndexes, "users"));
        assert_eq!(plan.verbs(), vec![Verb::Create, Verb::CreateIndexes]);
        assert!(!plan.is_select());
    }
}
