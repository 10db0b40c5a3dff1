use crate::helpers::eng_metrics;

#[test]
fn cli_generates_man_page() {
  let dir = test_support::tempdir();
  let out = eng_metrics(dir.path()).arg("--gen-man").output().unwrap();
  assert!(out.status.success());
  let s = String::from_utf8_lossy(&out.stdout);
  // clap_mangen emits a roff manpage starting with .TH and mentions the binary name
  assert!(s.contains(".TH"));
  assert!(s.contains("eng-metrics"));
}

#[test]
fn help_lists_every_report() {
  let dir = test_support::tempdir();
  let out = eng_metrics(dir.path()).arg("--help").output().unwrap();
  assert!(out.status.success());
  let s = String::from_utf8_lossy(&out.stdout);
  for report in [
    "cycle-time",
    "engineering-excellence",
    "bug-stats",
    "release-failure",
    "individual",
    "releases",
    "lines-changed",
    "pr-performance",
    "code-review",
    "active-repos",
    "epic-tracking",
    "bug-priority",
    "developer-activity",
  ] {
    assert!(s.contains(report), "--help is missing {report}");
  }
}
