// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Namespace for the external API seams (GitHub REST/GraphQL, Jira search) and the Jira issue model
// role: integrations/namespace
// outputs: Public submodules exposing API traits with HTTP, fixture and cached backends
// invariants: Reports only talk to the network through these traits; fixture backends never touch the network
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

pub mod github_api;
pub mod jira_api;
pub mod jira_issue;
