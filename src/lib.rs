pub mod error;
pub mod matcher;
pub mod replacer;
pub mod request;
pub mod vars;

pub use error::WaymarkError;
pub use matcher::{
    build_matcher_set_list, register_matcher, Context, MatchHeader, MatchHeaderRE, MatchHost,
    MatchNot, MatchPath, MatchPathRE, MatchQuery, MatchRegexp, MatchVarsRE, Matcher, MatcherSet,
    MatcherSetList,
};
pub use replacer::Replacer;
pub use request::{HttpRequest, RequestParts};
pub use vars::VarsStore;
