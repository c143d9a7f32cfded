use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, out);
        } else if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

fn source_files() -> Vec<PathBuf> {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    collect_rs_files(&manifest.join("src"), &mut files);
    collect_rs_files(&manifest.join("../../libs/greatideas-db/src"), &mut files);
    files
}

fn line_number(content: &str, byte_idx: usize) -> usize {
    content[..byte_idx].bytes().filter(|b| *b == b'\n').count() + 1
}

/// First string literal argument of the `sqlx::query*` call starting at `call_idx`.
fn sql_literal_at(content: &str, call_idx: usize) -> Option<String> {
    let open = call_idx + content[call_idx..].find('(')? + 1;
    let rest = content[open..].trim_start();
    let bytes = rest.as_bytes();

    if bytes.first() == Some(&b'r') {
        let hashes = rest[1..].bytes().take_while(|b| *b == b'#').count();
        let body = rest.get(1 + hashes..)?.strip_prefix('"')?;
        let end_marker = format!("\"{}", "#".repeat(hashes));
        return body.find(&end_marker).map(|end| body[..end].to_string());
    }

    let body = rest.strip_prefix('"')?;
    let mut escaped = false;
    for (i, b) in body.bytes().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' => escaped = true,
            b'"' => return Some(body[..i].to_string()),
            _ => {}
        }
    }
    None
}

fn sql_literals(content: &str) -> Vec<(usize, String)> {
    content
        .match_indices("sqlx::query")
        .filter_map(|(idx, _)| sql_literal_at(content, idx).map(|sql| (idx, sql)))
        .collect()
}

fn violations(check: impl Fn(&str) -> bool, what: &str) -> Vec<String> {
    let mut found = Vec::new();
    for file in source_files() {
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        for (idx, sql) in sql_literals(&content) {
            if check(&sql) {
                found.push(format!("{}:{} {}", file.display(), line_number(&content, idx), what));
            }
        }
    }
    found
}

#[test]
fn sqlx_queries_use_sqlite_placeholders() {
    let found = violations(
        |sql| sql.as_bytes().windows(2).any(|w| w[0] == b'$' && w[1].is_ascii_digit()),
        "uses a $N placeholder",
    );
    assert!(found.is_empty(), "Found Postgres placeholders:\n{}", found.join("\n"));
}

#[test]
fn sqlx_queries_avoid_postgres_only_syntax() {
    let found = violations(
        |sql| {
            let lower = sql.to_lowercase();
            lower.contains(" ilike ") || lower.contains("now()") || lower.contains("::") || lower.contains("serial")
        },
        "contains Postgres-only SQL",
    );
    assert!(found.is_empty(), "Found Postgres-specific SQL:\n{}", found.join("\n"));
}

#[test]
fn literal_parser_handles_raw_and_escaped_strings() {
    let code = r##"let a = sqlx::query(r#"SELECT "x" FROM t WHERE id = ?"#); let b = sqlx::query_as::<_, T>("SELECT \"y\" WHERE z = ?");"##;
    let found = sql_literals(code);
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].1, r#"SELECT "x" FROM t WHERE id = ?"#);
    assert_eq!(found[1].1, r#"SELECT \"y\" WHERE z = ?"#);
}
