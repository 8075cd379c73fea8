//! Server-side aggregation pipelines.
//!
//! Stages mirror the document-database primitives the services need: match,
//! sort, window, left join, array average and projection.

use serde_json::Value;

use crate::filter::{Filter, SortOrder};

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Sort(Vec<(String, SortOrder)>),
    Skip(u64),
    Limit(u64),
    /// Left join: every document of `from` whose `foreign_field` equals this
    /// document's `local_field` is collected into the array `as_field`.
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    /// `output` = mean of `field` across the objects in array `input`, or
    /// null when there is nothing to average.
    Average {
        input: String,
        field: String,
        output: String,
    },
    /// Keep only the listed fields (plus `_id`).
    Project(Vec<Projection>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Field(String),
    /// Keep `field`, substituting `fallback` when it is missing or null.
    OrElse { field: String, fallback: Value },
}

impl Projection {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn or_else(name: impl Into<String>, fallback: impl Into<Value>) -> Self {
        Self::OrElse {
            field: name.into(),
            fallback: fallback.into(),
        }
    }
}

/// Ordered list of stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn matching(mut self, filter: Filter) -> Self {
        self.stages.push(Stage::Match(filter));
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.stages.push(Stage::Sort(vec![(field.into(), order)]));
        self
    }

    pub fn skip(mut self, count: u64) -> Self {
        self.stages.push(Stage::Skip(count));
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.stages.push(Stage::Limit(count));
        self
    }

    pub fn lookup(
        mut self,
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Self {
        self.stages.push(Stage::Lookup {
            from: from.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            as_field: as_field.into(),
        });
        self
    }

    pub fn average(
        mut self,
        input: impl Into<String>,
        field: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.stages.push(Stage::Average {
            input: input.into(),
            field: field.into(),
            output: output.into(),
        });
        self
    }

    pub fn project(mut self, projections: Vec<Projection>) -> Self {
        self.stages.push(Stage::Project(projections));
        self
    }
}
