//! Request target rewriting
//!
//! OData key predicates and filters (`Entity(1,'a')`, `Name eq 'x'`) must
//! reach the server as written. The raw URL is therefore split into an
//! opaque path and a query that is only touched to encode spaces.

/// Leading non-empty segments dropped from a raw URL (scheme and authority
/// for an absolute URL)
const ROUTING_PREFIX_SEGMENTS: usize = 2;

/// Path and query of one dispatched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    segments: Vec<String>,
    query: Option<String>,
}

impl RequestTarget {
    /// Split `raw_url` at its last `?` and strip the routing prefix from the path.
    ///
    /// An empty query (`Entity?`) counts as no query.
    pub fn parse(raw_url: &str) -> Self {
        let (path, query) = match raw_url.rsplit_once('?') {
            Some((path, query)) => (path, Some(query).filter(|q| !q.is_empty())),
            None => (raw_url, None),
        };

        Self {
            segments: opaque_segments(path),
            query: query.map(String::from),
        }
    }

    /// Path segments after the routing prefix, in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Raw query as given, without the leading `?`
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Opaque path: remaining segments rejoined with `/`, always rooted
    pub fn opaque_path(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        self.segments.iter().map(|s| format!("/{}", s)).collect()
    }

    /// Query with literal spaces encoded as `%20`; everything else untouched
    pub fn escaped_query(&self) -> Option<String> {
        self.query.as_ref().map(|q| q.replace(' ', "%20"))
    }

    /// Origin-relative request target: opaque path plus escaped query
    pub fn request_target(&self) -> String {
        match self.escaped_query() {
            Some(query) => format!("{}?{}", self.opaque_path(), query),
            None => self.opaque_path(),
        }
    }
}

/// Drop the first [`ROUTING_PREFIX_SEGMENTS`] non-empty segments of `path`.
///
/// Segments after the prefix are kept as they are, empty ones included, so a
/// trailing slash survives.
fn opaque_segments(path: &str) -> Vec<String> {
    let mut dropped = 0;

    path.split('/')
        .skip_while(|segment| {
            if dropped == ROUTING_PREFIX_SEGMENTS {
                return false;
            }
            if !segment.is_empty() {
                dropped += 1;
            }
            true
        })
        .map(String::from)
        .collect()
}

/// Append `$format=<format>` to a request path, keeping any existing query.
pub fn with_format(path: &str, format: &str) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}$format={}", path, separator, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_drops_two_segments() {
        let target = RequestTarget::parse("/a/b/Entity?Name eq 'x'");

        assert_eq!(target.segments(), ["Entity"]);
        assert_eq!(target.opaque_path(), "/Entity");
        assert_eq!(target.query(), Some("Name eq 'x'"));
        assert_eq!(target.escaped_query().as_deref(), Some("Name%20eq%20'x'"));
        assert_eq!(target.request_target(), "/Entity?Name%20eq%20'x'");
    }

    #[test]
    fn test_absolute_url_drops_scheme_and_authority() {
        let target = RequestTarget::parse(
            "http://host:1337/default.ixsp/odata.svc/Orders(1,'A')?$filter=Qty gt 2 and Id eq 'k'",
        );

        assert_eq!(target.opaque_path(), "/default.ixsp/odata.svc/Orders(1,'A')");
        assert_eq!(
            target.escaped_query().as_deref(),
            Some("$filter=Qty%20gt%202%20and%20Id%20eq%20'k'")
        );
    }

    #[test]
    fn test_splits_on_last_question_mark() {
        let target = RequestTarget::parse("/a/b/Entity?x=1?y=2");

        assert_eq!(target.segments(), ["Entity?x=1"]);
        assert_eq!(target.query(), Some("y=2"));
    }

    #[test]
    fn test_no_query() {
        let target = RequestTarget::parse("/a/b/Entity");
        assert_eq!(target.query(), None);
        assert_eq!(target.request_target(), "/Entity");

        let target = RequestTarget::parse("/a/b/Entity?");
        assert_eq!(target.query(), None);
        assert_eq!(target.request_target(), "/Entity");
    }

    #[test]
    fn test_trailing_slash_and_short_paths() {
        assert_eq!(RequestTarget::parse("/a/b/Entity/").opaque_path(), "/Entity/");
        assert_eq!(RequestTarget::parse("/a/b").opaque_path(), "/");
        assert_eq!(RequestTarget::parse("").opaque_path(), "/");
    }

    #[test]
    fn test_query_keeps_existing_escapes() {
        let target = RequestTarget::parse("/a/b/E?$filter=Name eq 'a%2Fb'");
        assert_eq!(
            target.escaped_query().as_deref(),
            Some("$filter=Name%20eq%20'a%2Fb'")
        );
    }

    #[test]
    fn test_with_format() {
        assert_eq!(with_format("/E", "json"), "/E?$format=json");
        assert_eq!(with_format("/E?$top=1", "json"), "/E?$top=1&$format=json");
    }
}
