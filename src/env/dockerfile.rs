// ABOUTME: Dockerfile rewriting for build-time variables.
// ABOUTME: Injects per-stage ARG declarations or per-RUN secret mounts.

/// Header enabling the BuildKit frontend that understands `--mount=type=secret,env=`.
const SYNTAX_HEADER: &str = "# syntax=docker/dockerfile:1";

fn instruction(line: &str) -> Option<(String, &str)> {
    let trimmed = line.trim_start();
    let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    if end == 0 || trimmed.starts_with('#') {
        return None;
    }
    Some((trimmed[..end].to_ascii_uppercase(), trimmed[end..].trim_start()))
}

fn declared_arg(rest: &str) -> &str {
    let name_end = rest
        .find(|c: char| c == '=' || c.is_whitespace())
        .unwrap_or(rest.len());
    &rest[..name_end]
}

/// Insert `ARG <key>` after every `FROM`, once per stage, skipping names the
/// stage already declares.
pub fn inject_build_args<S: AsRef<str>>(dockerfile: &str, keys: &[S]) -> String {
    let lines: Vec<&str> = dockerfile.lines().collect();
    let mut out = Vec::with_capacity(lines.len() + keys.len());

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        out.push(line.to_string());
        i += 1;

        if !matches!(instruction(line), Some((ref op, _)) if op == "FROM") {
            continue;
        }

        let stage_end = lines[i..]
            .iter()
            .position(|l| matches!(instruction(l), Some((ref op, _)) if op == "FROM"))
            .map(|p| i + p)
            .unwrap_or(lines.len());
        let declared: Vec<&str> = lines[i..stage_end]
            .iter()
            .filter_map(|l| match instruction(l) {
                Some((op, rest)) if op == "ARG" => Some(declared_arg(rest)),
                _ => None,
            })
            .collect();

        for key in keys {
            let key = key.as_ref();
            if !declared.contains(&key) {
                out.push(format!("ARG {key}"));
            }
        }
    }

    join_lines(out, dockerfile)
}

/// Mount each key as a secret on every `RUN`, exposed as an env var for that
/// instruction only.
pub fn add_secret_mounts<S: AsRef<str>>(dockerfile: &str, keys: &[S]) -> String {
    let mut out: Vec<String> = Vec::new();
    let has_syntax = dockerfile
        .lines()
        .next()
        .is_some_and(|l| l.trim_start().to_ascii_lowercase().starts_with("# syntax="));
    if !has_syntax {
        out.push(SYNTAX_HEADER.to_string());
    }

    for line in dockerfile.lines() {
        match instruction(line) {
            Some((op, rest)) if op == "RUN" => {
                let indent = &line[..line.len() - line.trim_start().len()];
                let mut mounts = String::new();
                for key in keys {
                    let key = key.as_ref();
                    let mount = format!("--mount=type=secret,id={key},env={key}");
                    if !rest.contains(&format!("--mount=type=secret,id={key},")) {
                        mounts.push_str(&mount);
                        mounts.push(' ');
                    }
                }
                out.push(format!("{indent}RUN {mounts}{rest}"));
            }
            _ => out.push(line.to_string()),
        }
    }

    join_lines(out, dockerfile)
}

/// Whether the image defines its own health check.
pub fn has_healthcheck(dockerfile: &str) -> bool {
    dockerfile.lines().any(|line| match instruction(line) {
        Some((op, rest)) => op == "HEALTHCHECK" && !rest.eq_ignore_ascii_case("none"),
        None => false,
    })
}

fn join_lines(lines: Vec<String>, original: &str) -> String {
    let mut joined = lines.join("\n");
    if original.ends_with('\n') {
        joined.push('\n');
    }
    joined
}
