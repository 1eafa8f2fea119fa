#[test]
fn html_root_url() {
	version_sync::assert_html_root_url_updated!("src/lib.rs");
}

#[test]
fn installation() {
	version_sync::assert_contains_regex!("README.md", "^cargo add {name}$");
}

#[test]
fn markdown() {
	version_sync::assert_markdown_deps_updated!("README.md");
}

#[test]
fn homepage() {
	version_sync::assert_contains_regex!("Cargo.toml", r#"^homepage = "https://github.com/vanyle/{name}/tree/v{version}"$"#);
}

#[test]
fn documentation() {
	version_sync::assert_contains_regex!("Cargo.toml", r#"^documentation = "https://docs.rs/{name}/{version}"$"#);
}
