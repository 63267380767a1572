//! Build script for pkit-runtime
//!
//! Merges compile-time configuration:
//! 1. Library defaults below
//! 2. Values from the file named by `PKIT_CONFIG_RS`, if set (user wins)
//! 3. Result written to `OUT_DIR/pkit_merged_config.rs`
//!
//! The user file lists only the constants it changes, e.g.
//!
//! ```text
//! pub const WORKER_STACK_SIZE: usize = 256 * 1024;
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

const CONFIG_PARAMS: &[ConfigParam] = &[
    ConfigParam {
        name: "WORKER_STACK_SIZE",
        rust_type: "usize",
        default_value: "128 * 1024",
    },
    ConfigParam {
        name: "WORKER_PARK_TIMEOUT_MS",
        rust_type: "u64",
        default_value: "100",
    },
    ConfigParam {
        name: "BINSTACK_PREALLOC",
        rust_type: "usize",
        default_value: "16 * 1024",
    },
];

fn main() {
    let Ok(out_dir) = env::var("OUT_DIR") else {
        panic!("OUT_DIR not set");
    };
    let dest_path = Path::new(&out_dir).join("pkit_merged_config.rs");

    let mut config: HashMap<&str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    let user_path = env::var("PKIT_CONFIG_RS").ok();
    if let Some(user_path) = &user_path {
        println!("cargo:rerun-if-changed={}", user_path);
        match fs::read_to_string(user_path) {
            Ok(content) => {
                parse_and_merge(&content, &mut config);
                println!("cargo:warning=Using custom config: {}", user_path);
            }
            Err(e) => {
                println!("cargo:warning=Failed to read PKIT_CONFIG_RS ({}): {}", user_path, e);
            }
        }
    }
    println!("cargo:rerun-if-env-changed=PKIT_CONFIG_RS");

    let output = generate_config(&config, user_path.is_some());
    if let Err(e) = fs::write(&dest_path, output) {
        panic!("failed to write {}: {}", dest_path.display(), e);
    }
}

/// Merge `pub const NAME: TYPE = VALUE;` lines of known parameters
fn parse_and_merge(content: &str, config: &mut HashMap<&str, String>) {
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        let Some((name, value)) = parse_const_line(line) else {
            continue;
        };
        match CONFIG_PARAMS.iter().find(|p| p.name == name) {
            Some(param) => {
                config.insert(param.name, value);
            }
            None => println!("cargo:warning=Unknown config parameter: {}", name),
        }
    }
}

fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();
    let colon = rest.find(':')?;
    let eq = rest.find('=')?;
    let semi = rest.rfind(';').unwrap_or(rest.len());
    if eq < colon || semi < eq {
        return None;
    }
    Some((rest[..colon].trim().to_string(), rest[eq + 1..semi].trim().to_string()))
}

fn generate_config(config: &HashMap<&str, String>, custom: bool) -> String {
    let mut output = String::from("// Auto-generated by build.rs - do not edit\n");
    output.push_str("// Merged from library defaults");
    if custom {
        output.push_str(" and PKIT_CONFIG_RS");
    }
    output.push_str("\n\n");

    for param in CONFIG_PARAMS {
        let value = config.get(param.name).map(String::as_str).unwrap_or(param.default_value);
        output.push_str(&format!("pub const {}: {} = {};\n", param.name, param.rust_type, value));
    }
    output
}
