// ABOUTME: Git source retrieval commands and exact-ref commit resolution.
// ABOUTME: Only an exact ref match counts, so `main` never resolves to `main-old`.

use crate::config::SourceConfig;
use crate::executor::shell_quote;
use crate::types::Commit;

/// The ref a run tracks: a branch head or a pull request head.
pub fn tracked_ref(source: &SourceConfig, pull_request_id: u32) -> String {
    match pull_request_id {
        0 => format!("refs/heads/{}", source.branch),
        id => format!("refs/pull/{id}/head"),
    }
}

pub fn ls_remote_command(source: &SourceConfig, exact_ref: &str) -> String {
    format!(
        "GIT_TERMINAL_PROMPT=0 git ls-remote {} {}",
        shell_quote(&source.repository),
        shell_quote(exact_ref)
    )
}

/// Pick the sha whose ref equals `exact_ref`. `git ls-remote` matches refs by
/// suffix, so the output may contain lookalikes.
pub fn parse_ls_remote(output: &str, exact_ref: &str) -> Option<Commit> {
    output.lines().find_map(|line| {
        let (sha, name) = line.split_once(char::is_whitespace)?;
        if name.trim() == exact_ref {
            Commit::sha(sha).ok()
        } else {
            None
        }
    })
}

/// Commands that populate `workdir` with the requested revision.
pub fn clone_commands(
    source: &SourceConfig,
    workdir: &str,
    commit: &Commit,
    pull_request_id: u32,
) -> Vec<String> {
    let dir = shell_quote(workdir);
    let mut commands = vec![format!(
        "GIT_TERMINAL_PROMPT=0 git clone --depth=1 --branch {} {} {dir}",
        shell_quote(&source.branch),
        shell_quote(&source.repository),
    )];

    if pull_request_id != 0 {
        commands.push(format!(
            "cd {dir} && git fetch --depth=1 origin pull/{pull_request_id}/head:pr-{pull_request_id} && git -c advice.detachedHead=false checkout pr-{pull_request_id}"
        ));
    }

    if let Some(sha) = commit.as_sha() {
        commands.push(format!(
            "cd {dir} && git fetch --depth=1 origin {sha} && git -c advice.detachedHead=false checkout {sha}"
        ));
    }

    if source.submodules {
        commands.push(format!(
            "cd {dir} && if [ -f .gitmodules ]; then git submodule update --init --recursive --depth=1; fi"
        ));
    }

    if source.lfs {
        commands.push(format!(
            "cd {dir} && if git lfs env >/dev/null 2>&1; then git lfs pull; fi"
        ));
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceConfig {
        SourceConfig {
            repository: "https://github.com/acme/api.git".to_string(),
            branch: "main".to_string(),
            base_directory: "/".to_string(),
            submodules: false,
            lfs: false,
        }
    }

    #[test]
    fn exact_ref_ignores_lookalike_branches() {
        let output = "\
1111111111111111111111111111111111111111\trefs/heads/feature/main
2222222222222222222222222222222222222222\trefs/heads/main
3333333333333333333333333333333333333333\trefs/heads/main-old
";
        let commit = parse_ls_remote(output, "refs/heads/main").unwrap();
        assert_eq!(commit.as_sha(), Some("2222222222222222222222222222222222222222"));
    }

    #[test]
    fn missing_ref_resolves_to_nothing() {
        let output = "3333333333333333333333333333333333333333\trefs/heads/main-old\n";
        assert!(parse_ls_remote(output, "refs/heads/main").is_none());
        assert!(parse_ls_remote("", "refs/heads/main").is_none());
    }

    #[test]
    fn pull_requests_track_their_head_ref() {
        assert_eq!(tracked_ref(&source(), 0), "refs/heads/main");
        assert_eq!(tracked_ref(&source(), 9), "refs/pull/9/head");
    }

    #[test]
    fn clone_checks_out_the_resolved_commit() {
        let sha = Commit::sha("abcdef1").unwrap();
        let commands = clone_commands(&source(), "/artifacts/d1", &sha, 0);
        assert_eq!(commands.len(), 2);
        assert!(commands[0].contains("--branch 'main' 'https://github.com/acme/api.git' '/artifacts/d1'"));
        assert!(commands[1].ends_with("checkout abcdef1"));
    }

    #[test]
    fn pull_request_clone_fetches_the_pr_head() {
        let mut src = source();
        src.submodules = true;
        let commands = clone_commands(&src, "/w", &Commit::Head, 3);
        assert!(commands[1].contains("pull/3/head:pr-3"));
        assert!(commands[2].contains("submodule update"));
    }
}
