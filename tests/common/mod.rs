//! Shared fixtures for the zkcir-infra integration tests.
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use serde_json::Value as Json;
use tempfile::TempDir;

use zkcir_infra::config::Config;
use zkcir_infra::template::Template;
use zkcir_infra::zkcir::ZkcirStack;

/// Multi-stage Dockerfile with both build targets.
pub const DOCKERFILE: &str = "\
FROM rust:1.85 AS builder
WORKDIR /app
COPY . .
RUN cargo build --release

FROM debian:bookworm-slim AS core-ecs
COPY --from=builder /app/target/release/core /usr/local/bin/core
CMD [\"core\"]

FROM public.ecr.aws/lambda/provided:al2023 AS compile-lambda
COPY --from=builder /app/target/release/compile /var/runtime/bootstrap
";

/// A build context shaped like the zkcir repository root.
pub struct BuildContext {
    pub dir: TempDir,
}

impl BuildContext {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), DOCKERFILE).unwrap();
        fs::create_dir_all(dir.path().join("core/src")).unwrap();
        fs::write(dir.path().join("core/src/main.rs"), "fn main() {}\n").unwrap();
        fs::create_dir_all(dir.path().join("cdk")).unwrap();
        fs::write(dir.path().join("cdk/cdk.json"), "{}\n").unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Defaults pointed at this context.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.build.context = self.path().to_path_buf();
        config
    }

    pub fn build(&self) -> ZkcirStack {
        ZkcirStack::build(&self.config()).unwrap()
    }

    pub fn template(&self) -> Template {
        self.build().stack().synth().unwrap()
    }
}

/// Logical ids named by `Ref` or `Fn::GetAtt` anywhere in `value`.
pub fn referenced_ids(value: &Json) -> Vec<String> {
    let mut ids = Vec::new();
    walk(value, &mut ids);
    ids
}

fn walk(value: &Json, ids: &mut Vec<String>) {
    match value {
        Json::Object(map) => {
            if let Some(Json::String(id)) = map.get("Ref") {
                ids.push(id.clone());
            }
            if let Some(target) = map
                .get("Fn::GetAtt")
                .and_then(|v| v.get(0))
                .and_then(Json::as_str)
            {
                ids.push(target.to_string());
            }
            map.values().for_each(|v| walk(v, ids));
        }
        Json::Array(items) => items.iter().for_each(|v| walk(v, ids)),
        _ => {}
    }
}
