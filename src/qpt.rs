//! Query/para/title triples for batch calls.

use serde::{Deserialize, Serialize};

use crate::generator::Example;

/// One query/para/title group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qpt {
    pub query: String,
    pub para: String,
    #[serde(default)]
    pub title: String,
}

impl Qpt {
    pub fn new(
        query: impl Into<String>,
        para: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            para: para.into(),
            title: title.into(),
        }
    }
}

impl From<&Qpt> for Example {
    fn from(q: &Qpt) -> Self {
        Example::new(q.query.as_str(), q.title.as_str(), q.para.as_str())
    }
}

/// A batch of [`Qpt`]s with column accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qpts(pub Vec<Qpt>);

impl Qpts {
    /// All queries, in order.
    pub fn q(&self) -> Vec<&str> {
        self.0.iter().map(|x| x.query.as_str()).collect()
    }

    /// All paras, in order.
    pub fn p(&self) -> Vec<&str> {
        self.0.iter().map(|x| x.para.as_str()).collect()
    }

    /// All titles, in order.
    pub fn t(&self) -> Vec<&str> {
        self.0.iter().map(|x| x.title.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Qpt> {
        self.0.iter()
    }
}

impl From<Vec<Qpt>> for Qpts {
    fn from(v: Vec<Qpt>) -> Self {
        Self(v)
    }
}

impl FromIterator<Qpt> for Qpts {
    fn from_iter<I: IntoIterator<Item = Qpt>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
