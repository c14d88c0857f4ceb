//! Shared HTTP constants (cookies, headers, problem URIs).

pub(crate) const MEMBER_COOKIE: &str = "session_token";
pub(crate) const ADMIN_COOKIE: &str = "admin_token";
pub(crate) const HEADER_MEMBER_TOKEN: &str = "x-gatehouse-token";
pub(crate) const HEADER_ADMIN_TOKEN: &str = "x-gatehouse-admin-token";
pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
pub(crate) const BEARER_PREFIX: &str = "Bearer ";

pub(crate) const PROBLEM_INTERNAL: &str = "https://gatehouse.dev/problems/internal";
pub(crate) const PROBLEM_UNAUTHORIZED: &str = "https://gatehouse.dev/problems/unauthorized";
pub(crate) const PROBLEM_FORBIDDEN: &str = "https://gatehouse.dev/problems/forbidden";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://gatehouse.dev/problems/bad-request";
pub(crate) const PROBLEM_CONFLICT: &str = "https://gatehouse.dev/problems/conflict";
pub(crate) const PROBLEM_NOT_FOUND: &str = "https://gatehouse.dev/problems/not-found";
pub(crate) const PROBLEM_SERVICE_UNAVAILABLE: &str =
    "https://gatehouse.dev/problems/service-unavailable";
