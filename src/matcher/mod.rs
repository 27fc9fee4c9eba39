pub mod header;
pub mod host;
pub mod path;
pub mod query;
pub mod regexp;
pub mod registry;

pub use header::MatchHeader;
pub use host::MatchHost;
pub use path::MatchPath;
pub use query::MatchQuery;
pub use regexp::{MatchHeaderRE, MatchPathRE, MatchRegexp, MatchVarsRE};
pub use registry::{
    build_matcher_set_list, compile_cached_regex, matcher_from_config, matcher_set_from_config,
    matcher_set_list_from_config, register_matcher,
};

use crate::error::WaymarkError;
use crate::request::HttpRequest;
use std::fmt::Debug;

/// Server-wide provisioning context handed to every matcher once at config
/// load, before the first request.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Match paths with trailing dots and spaces stripped as well, for
    /// serving off filesystems that ignore them.
    pub strip_trailing_dots: bool,
}

/// A predicate over an HTTP request.
///
/// `matches` runs on every request; the other methods run once per config
/// load. Errors from `matches` are soft: the router treats them as "route
/// does not match" rather than failing the request.
pub trait Matcher: Send + Sync + Debug {
    fn provision(&mut self, _ctx: &Context) -> Result<(), WaymarkError> {
        Ok(())
    }

    fn validate(&self) -> Result<(), WaymarkError> {
        Ok(())
    }

    fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError>;

    fn cleanup(&mut self) {}
}

/// Conjunction of matchers. Evaluation follows declaration order and stops
/// at the first non-match, so capture side effects of earlier leaves are
/// visible to later ones.
#[derive(Debug, Default)]
pub struct MatcherSet {
    matchers: Vec<Box<dyn Matcher>>,
}

impl MatcherSet {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn push(&mut self, matcher: Box<dyn Matcher>) {
        self.matchers.push(matcher);
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn provision(&mut self, ctx: &Context) -> Result<(), WaymarkError> {
        for matcher in &mut self.matchers {
            matcher.provision(ctx)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), WaymarkError> {
        for matcher in &self.matchers {
            matcher.validate()?;
        }
        Ok(())
    }

    pub fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError> {
        for matcher in &self.matchers {
            req.check_deadline()?;
            if !matcher.matches(req)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn cleanup(&mut self) {
        for matcher in &mut self.matchers {
            matcher.cleanup();
        }
    }
}

/// Disjunction of matcher sets. The first matching set wins.
#[derive(Debug, Default)]
pub struct MatcherSetList {
    sets: Vec<MatcherSet>,
}

impl MatcherSetList {
    pub fn new(sets: Vec<MatcherSet>) -> Self {
        Self { sets }
    }

    pub fn push(&mut self, set: MatcherSet) {
        self.sets.push(set);
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn provision(&mut self, ctx: &Context) -> Result<(), WaymarkError> {
        for set in &mut self.sets {
            set.provision(ctx)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), WaymarkError> {
        for set in &self.sets {
            set.validate()?;
        }
        Ok(())
    }

    pub fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError> {
        for set in &self.sets {
            if set.matches(req)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn cleanup(&mut self) {
        for set in &mut self.sets {
            set.cleanup();
        }
    }
}

/// Matches iff the wrapped list does not. Side effects left behind by inner
/// evaluation (regex captures) stay in place either way.
#[derive(Debug, Default)]
pub struct MatchNot {
    matcher_sets: MatcherSetList,
}

impl MatchNot {
    pub fn new(matcher_sets: MatcherSetList) -> Self {
        Self { matcher_sets }
    }
}

impl Matcher for MatchNot {
    fn provision(&mut self, ctx: &Context) -> Result<(), WaymarkError> {
        self.matcher_sets.provision(ctx)
    }

    fn validate(&self) -> Result<(), WaymarkError> {
        self.matcher_sets.validate()
    }

    fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError> {
        Ok(!self.matcher_sets.matches(req)?)
    }

    fn cleanup(&mut self) {
        self.matcher_sets.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestParts;
    use http::{HeaderMap, Method};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request(host: &str, path: &str) -> HttpRequest {
        let parts = RequestParts::new(Method::GET, path.parse().unwrap(), HeaderMap::new())
            .with_host(host);
        HttpRequest::new(parts)
    }

    #[derive(Debug)]
    struct Fixed {
        result: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn boxed(result: bool, calls: &Arc<AtomicUsize>) -> Box<dyn Matcher> {
            Box::new(Fixed {
                result,
                calls: Arc::clone(calls),
            })
        }
    }

    impl Matcher for Fixed {
        fn matches(&self, _req: &HttpRequest) -> Result<bool, WaymarkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result)
        }
    }

    #[test]
    fn empty_set_matches_and_empty_list_does_not() {
        let req = request("example.com", "/");
        assert!(MatcherSet::default().matches(&req).unwrap());
        assert!(!MatcherSetList::default().matches(&req).unwrap());
    }

    #[test]
    fn and_short_circuits_on_first_false() {
        let req = request("example.com", "/");
        let calls = Arc::new(AtomicUsize::new(0));
        let set = MatcherSet::new(vec![
            Fixed::boxed(true, &calls),
            Fixed::boxed(false, &calls),
            Fixed::boxed(true, &calls),
        ]);
        assert!(!set.matches(&req).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn or_stops_at_first_matching_set() {
        let req = request("example.com", "/");
        let calls = Arc::new(AtomicUsize::new(0));
        let list = MatcherSetList::new(vec![
            MatcherSet::new(vec![Fixed::boxed(false, &calls)]),
            MatcherSet::new(vec![Fixed::boxed(true, &calls)]),
            MatcherSet::new(vec![Fixed::boxed(true, &calls)]),
        ]);
        assert!(list.matches(&req).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn not_negates_and_double_negation_restores() {
        let req = request("example.com", "/bar");
        let path = || -> Box<dyn Matcher> {
            let mut m = MatchPath::from(vec!["/foo".to_string()]);
            m.provision(&Context::default()).unwrap();
            Box::new(m)
        };

        let inner = MatchNot::new(MatcherSetList::new(vec![MatcherSet::new(vec![path()])]));
        assert!(inner.matches(&req).unwrap());

        let double = MatchNot::new(MatcherSetList::new(vec![MatcherSet::new(vec![
            Box::new(MatchNot::new(MatcherSetList::new(vec![MatcherSet::new(
                vec![path()],
            )]))),
        ])]));
        // same boolean as the bare path matcher
        assert!(!double.matches(&req).unwrap());
    }

    #[test]
    fn empty_not_matches_everything() {
        let req = request("example.com", "/");
        assert!(MatchNot::default().matches(&req).unwrap());
    }

    #[test]
    fn not_composition_over_sets() {
        // NOT over an OR list: matches only when no inner set matches
        let mk = |host: &str, path: &str| {
            let mut host_m = MatchHost::from(vec![host.to_string()]);
            host_m.provision(&Context::default()).unwrap();
            let mut path_m = MatchPath::from(vec![path.to_string()]);
            path_m.provision(&Context::default()).unwrap();
            MatchNot::new(MatcherSetList::new(vec![
                MatcherSet::new(vec![Box::new(path_m)]),
                MatcherSet::new(vec![Box::new(host_m)]),
            ]))
        };

        let not = mk("example.com", "/foo");
        assert!(!not.matches(&request("example.com", "/bar")).unwrap());
        let not = mk("sub.example.com", "/bar");
        assert!(not.matches(&request("example.com", "/foo")).unwrap());
    }

    #[test]
    fn and_or_monotonicity() {
        let req = request("example.com", "/");
        let calls = Arc::new(AtomicUsize::new(0));
        // a matching AND set keeps matching when leaves are removed
        let full = MatcherSet::new(vec![Fixed::boxed(true, &calls), Fixed::boxed(true, &calls)]);
        let subset = MatcherSet::new(vec![Fixed::boxed(true, &calls)]);
        assert!(full.matches(&req).unwrap());
        assert!(subset.matches(&req).unwrap());
        // a matching OR list keeps matching when sets are appended
        let mut list = MatcherSetList::new(vec![MatcherSet::new(vec![Fixed::boxed(true, &calls)])]);
        assert!(list.matches(&req).unwrap());
        list.push(MatcherSet::new(vec![Fixed::boxed(false, &calls)]));
        assert!(list.matches(&req).unwrap());
    }

    #[test]
    fn matching_is_idempotent() {
        let req = request("example.com", "/foo");
        let mut m = MatchPath::from(vec!["/foo".to_string()]);
        m.provision(&Context::default()).unwrap();
        for _ in 0..3 {
            assert!(m.matches(&req).unwrap());
        }
    }

    #[test]
    fn expired_deadline_propagates_as_canceled() {
        let parts = RequestParts::new(Method::GET, "/".parse().unwrap(), HeaderMap::new());
        let req = HttpRequest::new(parts)
            .with_deadline(std::time::Instant::now() - std::time::Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let set = MatcherSet::new(vec![Fixed::boxed(true, &calls)]);
        assert!(matches!(set.matches(&req), Err(WaymarkError::Canceled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
