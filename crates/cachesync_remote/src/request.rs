//! Wire shape of remote requests.
//!
//! Collection reads look like:
//!
//! ```text
//! GET <base>/dashboards?paging=false
//!     &fields=id,created,lastUpdated,name,displayName,dashboardItems[id,created,lastUpdated,name,displayName]
//!     &filter=id:eq:d1&filter=id:eq:d2
//! ```
//!
//! Expanded reads replace the projection with `:all` and `<field>[:all]`.

use crate::fetcher::Mutation;
use cachesync_model::KindSpec;
use std::fmt;

/// Identity fields returned by non-expanded reads.
pub const IDENTITY_FIELDS: &str = "id,created,lastUpdated,name,displayName";

/// Projection requesting every field.
const ALL_FIELDS: &str = ":all";

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read.
    Get,
    /// Create.
    Post,
    /// Replace.
    Put,
    /// Remove.
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// A read against the remote source, before it is bound to a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    path: Vec<String>,
    nested_field: Option<String>,
    ids: Vec<String>,
    expand: bool,
}

impl FetchRequest {
    /// Reads a collection, optionally restricted to `ids`.
    pub fn collection(spec: &KindSpec, ids: &[String], expand: bool) -> Self {
        Self {
            path: vec![spec.kind().as_str().to_string()],
            nested_field: spec.nested().map(|n| n.field.clone()),
            ids: ids.to_vec(),
            expand,
        }
    }

    /// Reads one fully expanded entity.
    pub fn item(spec: &KindSpec, id: &str) -> Self {
        Self {
            path: vec![spec.kind().as_str().to_string(), id.to_string()],
            nested_field: spec.nested().map(|n| n.field.clone()),
            ids: Vec::new(),
            expand: true,
        }
    }

    /// Returns the path segments below the base URL.
    pub fn path_segments(&self) -> &[String] {
        &self.path
    }

    /// Returns true if full bodies are requested.
    pub fn is_expanded(&self) -> bool {
        self.expand
    }

    /// Returns the `fields` projection.
    pub fn fields(&self) -> String {
        let projection = if self.expand { ALL_FIELDS } else { IDENTITY_FIELDS };
        match &self.nested_field {
            Some(field) => format!("{projection},{field}[{projection}]"),
            None => projection.to_string(),
        }
    }

    /// Returns the query parameters, in order.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(self.ids.len() + 2);
        if self.path.len() == 1 {
            pairs.push(("paging", "false".to_string()));
        }
        pairs.push(("fields", self.fields()));
        for id in &self.ids {
            pairs.push(("filter", format!("id:eq:{id}")));
        }
        pairs
    }
}

/// A write against the remote source, before it is bound to a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    /// Method to send.
    pub method: Method,
    /// Path segments below the base URL.
    pub path: Vec<String>,
}

impl MutationRequest {
    /// Maps a mutation of `spec` to its method and path.
    ///
    /// Creates go to the collection, updates and deletes to the entity, and
    /// nested deletes to `<kind>/<owner>/<field>/<item>`. A nested delete on
    /// a kind without nested items falls back to the kind name as field.
    pub fn for_mutation(spec: &KindSpec, mutation: &Mutation) -> Self {
        let kind = spec.kind().as_str().to_string();
        match mutation {
            Mutation::Create(_) => Self {
                method: Method::Post,
                path: vec![kind],
            },
            Mutation::Update(entity) => Self {
                method: Method::Put,
                path: vec![kind, entity.id.clone()],
            },
            Mutation::Delete { id } => Self {
                method: Method::Delete,
                path: vec![kind, id.clone()],
            },
            Mutation::DeleteNested { owner_id, item_id } => {
                let field = spec
                    .nested()
                    .map_or_else(|| kind.clone(), |n| n.field.clone());
                Self {
                    method: Method::Delete,
                    path: vec![kind, owner_id.clone(), field, item_id.clone()],
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachesync_model::Entity;

    fn dashboards() -> KindSpec {
        KindSpec::owning("dashboards", "dashboardItems", "dashboardItems")
    }

    #[test]
    fn lightweight_collection_projection() {
        let request = FetchRequest::collection(&dashboards(), &[], false);
        assert_eq!(
            request.fields(),
            "id,created,lastUpdated,name,displayName,dashboardItems[id,created,lastUpdated,name,displayName]"
        );
        assert_eq!(
            request.query_pairs(),
            vec![("paging", "false".to_string()), ("fields", request.fields())]
        );
    }

    #[test]
    fn flat_kind_has_no_nested_projection() {
        let request = FetchRequest::collection(&KindSpec::flat("charts"), &[], false);
        assert_eq!(request.fields(), IDENTITY_FIELDS);
    }

    #[test]
    fn expanded_collection_filters_by_id() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let request = FetchRequest::collection(&dashboards(), &ids, true);
        let pairs = request.query_pairs();

        assert_eq!(request.fields(), ":all,dashboardItems[:all]");
        assert_eq!(pairs[2], ("filter", "id:eq:a".to_string()));
        assert_eq!(pairs[3], ("filter", "id:eq:b".to_string()));
    }

    #[test]
    fn item_read_is_expanded_and_unpaged() {
        let request = FetchRequest::item(&dashboards(), "d1");
        assert!(request.is_expanded());
        assert_eq!(request.path_segments(), ["dashboards", "d1"]);
        assert!(request.query_pairs().iter().all(|(key, _)| *key != "paging"));
    }

    #[test]
    fn mutation_paths() {
        let spec = dashboards();
        let create = MutationRequest::for_mutation(&spec, &Mutation::Create(Entity::new("d1", "D")));
        assert_eq!(create.method, Method::Post);
        assert_eq!(create.path, ["dashboards"]);

        let update = MutationRequest::for_mutation(&spec, &Mutation::Update(Entity::new("d1", "D")));
        assert_eq!(update.method, Method::Put);
        assert_eq!(update.path, ["dashboards", "d1"]);

        let nested = MutationRequest::for_mutation(
            &spec,
            &Mutation::DeleteNested {
                owner_id: "d1".into(),
                item_id: "i1".into(),
            },
        );
        assert_eq!(nested.method, Method::Delete);
        assert_eq!(nested.path, ["dashboards", "d1", "dashboardItems", "i1"]);
    }
}
