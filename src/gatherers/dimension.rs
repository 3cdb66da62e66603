use crate::backend::SinkSession;
use std::collections::HashMap;
use tracing::warn;

/// Which sink dimension table an object is keyed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DimensionKind {
    Sproc,
    Table,
}

/// A monitored object as identified on its host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimension<'a> {
    pub kind: DimensionKind,
    pub schema: &'a str,
    pub name: &'a str,
}

impl<'a> Dimension<'a> {
    #[must_use]
    pub const fn new(kind: DimensionKind, schema: &'a str, name: &'a str) -> Self {
        Self { kind, schema, name }
    }
}

/// Memoized `(schema, name) -> id` lookups against the sink.
///
/// One cache belongs to one gatherer and is only touched from that host's
/// executor, so an uncached pair is never resolved twice concurrently.
/// Entries are never evicted.
#[derive(Debug, Default)]
pub struct DimensionCache {
    ids: HashMap<String, HashMap<String, i32>>,
}

impl DimensionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, schema: &str, name: &str) -> Option<i32> {
        self.ids.get(schema).and_then(|names| names.get(name)).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Return the cached id, or look it up (inserting if needed) in the sink.
    ///
    /// `None` means the id could not be obtained; the caller skips the
    /// sample. Failures are not cached, so the next tick tries again.
    pub async fn resolve<S: SinkSession>(
        &mut self,
        session: &mut S,
        host_id: i32,
        dimension: Dimension<'_>,
    ) -> Option<i32> {
        if dimension.schema.is_empty() || dimension.name.is_empty() {
            warn!(
                host_id,
                schema = dimension.schema,
                name = dimension.name,
                "refusing to resolve dimension with an empty name"
            );
            return None;
        }

        if let Some(id) = self.get(dimension.schema, dimension.name) {
            return Some(id);
        }

        match session.resolve_dimension(host_id, dimension).await {
            Ok(id) if id > 0 => {
                self.ids
                    .entry(dimension.schema.to_string())
                    .or_default()
                    .insert(dimension.name.to_string(), id);
                Some(id)
            }
            Ok(id) => {
                warn!(
                    host_id,
                    schema = dimension.schema,
                    name = dimension.name,
                    id,
                    "sink returned an invalid dimension id"
                );
                None
            }
            Err(e) => {
                warn!(
                    host_id,
                    schema = dimension.schema,
                    name = dimension.name,
                    error = %e,
                    "could not resolve dimension id"
                );
                None
            }
        }
    }
}
