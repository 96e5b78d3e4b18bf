use std::collections::HashMap;
use std::path::{Path, PathBuf};

use hcl::{Block, Body, Expression};
use tracing::{debug, info, warn};

use crate::errors::{Error, Result};
use crate::mappings;

/* ============================= TYPES ============================= */

/// A located resource block.
#[derive(Debug, Clone)]
pub struct ResourceMatch {
    pub file: PathBuf,
    pub resource_type: String,
    pub resource_name: String,
    pub block_text: String,
}

/// Module-level declarations surrounding a resource, included in the
/// inference prompt so generated fixes respect providers and variables.
#[derive(Debug, Clone, Default)]
pub struct ModuleContext {
    pub providers: Vec<String>,
    pub variables: Vec<String>,
    pub outputs: Vec<String>,
    pub modules: Vec<String>,
}

impl ModuleContext {
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
            && self.variables.is_empty()
            && self.outputs.is_empty()
            && self.modules.is_empty()
    }

    /// Compact rendering for prompt embedding.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (label, items) in [
            ("providers", &self.providers),
            ("variables", &self.variables),
            ("outputs", &self.outputs),
            ("modules", &self.modules),
        ] {
            if !items.is_empty() {
                out.push_str(&format!("{}: {}\n", label, items.join(", ")));
            }
        }
        out
    }
}

struct ParsedFile {
    content: String,
    body: Body,
}

/* ============================= ANALYZER ============================= */

/// Parses the HCL tree of a working copy and locates resources by their
/// canonical cloud identifier.
///
/// Files that fail to parse are skipped with a warning; the rest of the
/// tree stays searchable.
pub struct Analyzer {
    files: Vec<PathBuf>,
    parsed: HashMap<PathBuf, ParsedFile>,
    failed_files: usize,
}

impl Analyzer {
    /// Discover and parse every `.tf` file under `root`.
    pub fn load(root: &Path) -> Self {
        let mut files = Vec::new();
        collect_tf_files(root, &mut files);
        files.sort();

        let mut parsed = HashMap::new();
        let mut failed_files = 0;

        for file in &files {
            let content = match std::fs::read_to_string(file) {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "failed_to_read_terraform_file");
                    failed_files += 1;
                    continue;
                }
            };
            match hcl::parse(&content) {
                Ok(body) => {
                    parsed.insert(file.clone(), ParsedFile { content, body });
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "failed_to_parse_terraform_file");
                    failed_files += 1;
                }
            }
        }

        info!(
            total_files = files.len(),
            parsed_files = parsed.len(),
            failed_files,
            "terraform_tree_parsed"
        );

        Analyzer { files, parsed, failed_files }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn parsed_count(&self) -> usize {
        self.parsed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_files
    }

    /// Locate the resource block for a cloud identifier.
    ///
    /// With a mapped Terraform type, precise matches (arn attribute, bucket
    /// or name attribute, block label) within that type win; a bare
    /// type-only match is the fallback. Unmapped type tags degrade to a
    /// fuzzy scan by extracted name across all resource blocks.
    pub fn find_by_resource(&self, resource_arn: &str, type_tag: &str) -> Option<ResourceMatch> {
        let tf_type = mappings::terraform_type_for(type_tag);
        let wanted_name = extract_name_from_arn(resource_arn);

        debug!(
            resource_arn,
            type_tag,
            terraform_type = tf_type.unwrap_or("<unmapped>"),
            extracted_name = %wanted_name,
            "searching_for_resource"
        );

        match tf_type {
            Some(tf_type) => {
                let mut type_only: Option<ResourceMatch> = None;
                for file in &self.files {
                    let Some(parsed) = self.parsed.get(file) else { continue };
                    for block in resource_blocks(&parsed.body) {
                        let (rtype, rname) = match block_labels(block) {
                            Some(pair) => pair,
                            None => continue,
                        };
                        if rtype != tf_type {
                            continue;
                        }
                        if attr_equals(block, "arn", resource_arn)
                            || attr_equals(block, "bucket", &wanted_name)
                            || attr_equals(block, "name", &wanted_name)
                            || rname == wanted_name
                        {
                            return Some(self.matched(file, block, &rtype, &rname));
                        }
                        if type_only.is_none() {
                            type_only = Some(self.matched(file, block, &rtype, &rname));
                        }
                    }
                }
                type_only
            }
            None => {
                // Fuzzy pass: the type vocabulary drifted, match by name alone.
                for file in &self.files {
                    let Some(parsed) = self.parsed.get(file) else { continue };
                    for block in resource_blocks(&parsed.body) {
                        let (rtype, rname) = match block_labels(block) {
                            Some(pair) => pair,
                            None => continue,
                        };
                        if rname == wanted_name
                            || attr_equals(block, "bucket", &wanted_name)
                            || attr_equals(block, "name", &wanted_name)
                            || attr_equals(block, "arn", resource_arn)
                        {
                            return Some(self.matched(file, block, &rtype, &rname));
                        }
                    }
                }
                None
            }
        }
    }

    fn matched(&self, file: &Path, block: &Block, rtype: &str, rname: &str) -> ResourceMatch {
        debug!(
            file = %file.display(),
            resource_type = rtype,
            resource_name = rname,
            "resource_located"
        );
        ResourceMatch {
            file: file.to_path_buf(),
            resource_type: rtype.to_string(),
            resource_name: rname.to_string(),
            block_text: render_block(block, rtype, rname),
        }
    }

    /// Provider, variable, output, and module declarations in a file.
    pub fn module_context(&self, file: &Path) -> ModuleContext {
        let mut context = ModuleContext::default();
        let Some(parsed) = self.parsed.get(file) else {
            return context;
        };

        for block in parsed.body.blocks() {
            let first_label = block
                .labels()
                .first()
                .map(|l| l.as_str().to_string())
                .unwrap_or_default();
            match block.identifier() {
                "provider" => context.providers.push(first_label),
                "variable" => context.variables.push(first_label),
                "output" => context.outputs.push(first_label),
                "module" => context.modules.push(first_label),
                _ => {}
            }
        }

        context
    }

    /// Raw source of a successfully-parsed file.
    pub fn file_content(&self, file: &Path) -> Result<&str> {
        self.parsed
            .get(file)
            .map(|p| p.content.as_str())
            .ok_or_else(|| {
                Error::hcl_parse(
                    format!("file {} was not successfully parsed", file.display()),
                    Some(file.display().to_string()),
                )
            })
    }
}

/* ============================= NAME EXTRACTION ============================= */

/// Extract the resource name from a canonical cloud identifier.
///
/// S3-shaped identifiers (`arn:aws:s3:::name/key`) yield the bucket name;
/// slash-bearing identifiers yield the segment after the last slash;
/// anything else yields the segment after the last colon.
pub fn extract_name_from_arn(arn: &str) -> String {
    if let Some(rest) = arn.split(":::").nth(1) {
        return rest.split('/').next().unwrap_or(rest).to_string();
    }
    if arn.contains('/') {
        return arn.rsplit('/').next().unwrap_or(arn).to_string();
    }
    arn.rsplit(':').next().unwrap_or(arn).to_string()
}

/* ============================= HCL HELPERS ============================= */

fn collect_tf_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tf_files(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "tf") {
            out.push(path);
        }
    }
}

fn resource_blocks(body: &Body) -> impl Iterator<Item = &Block> {
    body.blocks().filter(|b| b.identifier() == "resource")
}

fn block_labels(block: &Block) -> Option<(String, String)> {
    let labels = block.labels();
    if labels.len() < 2 {
        return None;
    }
    Some((labels[0].as_str().to_string(), labels[1].as_str().to_string()))
}

fn attr_equals(block: &Block, key: &str, expected: &str) -> bool {
    block
        .body()
        .attributes()
        .find(|a| a.key() == key)
        .is_some_and(|a| matches!(a.expr(), Expression::String(s) if s == expected))
}

fn render_block(block: &Block, rtype: &str, rname: &str) -> String {
    hcl::format::to_string(block)
        .unwrap_or_else(|_| format!("resource \"{rtype}\" \"{rname}\" {{}}"))
}
