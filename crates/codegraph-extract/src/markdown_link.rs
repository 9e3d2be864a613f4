use crate::{Extractor, ExtractionContext, ExtractionStats, empty_metadata, reclaim_ownership, upsert_owned_edge, upsert_symbol_node};
use codegraph_core::{GraphResult, Language, node_types};
use codegraph_query::QueryRegistry;
use codegraph_storage::GraphStore;
use serde_json::json;

const OWNED: &[&str] = &["references"];

const SUPPORTED: &[Language] = &[Language::Markdown];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "bmp"];

/// Produces `references` edges from a markdown file to whatever its
/// links point at — a heading inside the document, another file, or an
/// external URL/image. The classification lives on edge
/// `metadata["link_kind"]` rather than as distinct edge types, since it's
/// advisory rather than something the Inference Engine needs to reason
/// about structurally.
pub struct MarkdownLinkExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    ExternalUrl,
    InternalFile,
    Image,
    Reference,
}

impl LinkKind {
    fn as_str(self) -> &'static str {
        match self {
            LinkKind::ExternalUrl => "external-url",
            LinkKind::InternalFile => "internal-file",
            LinkKind::Image => "image",
            LinkKind::Reference => "reference",
        }
    }
}

fn classify(destination: &str, is_image_node: bool) -> LinkKind {
    if is_image_node || has_image_extension(destination) {
        return LinkKind::Image;
    }
    if destination.starts_with("http://") || destination.starts_with("https://") || destination.starts_with("//") {
        return LinkKind::ExternalUrl;
    }
    if destination.starts_with('#') {
        return LinkKind::Reference;
    }
    if destination.starts_with('.') || destination.starts_with('/') || destination.contains('/') {
        return LinkKind::InternalFile;
    }
    LinkKind::Reference
}

fn has_image_extension(destination: &str) -> bool {
    let without_anchor = destination.split('#').next().unwrap_or(destination);
    match without_anchor.rsplit('.').next() {
        Some(ext) => IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

impl Extractor for MarkdownLinkExtractor {
    fn languages(&self) -> &'static [Language] {
        SUPPORTED
    }

    fn owned_edge_types(&self) -> &'static [&'static str] {
        OWNED
    }

    fn register_queries(&self, queries: &QueryRegistry) -> GraphResult<()> {
        queries.register(
            Language::Markdown,
            "markdown-links",
            "(inline_link destination: (link_destination) @destination)",
        )?;
        queries.register(
            Language::Markdown,
            "markdown-images",
            "(image (link_destination) @destination)",
        )?;
        queries.register(
            Language::Markdown,
            "markdown-headings",
            "(atx_heading (inline) @text)",
        )?;
        Ok(())
    }

    fn extract(&self, ctx: &ExtractionContext, store: &GraphStore) -> GraphResult<ExtractionStats> {
        let mut stats = ExtractionStats::default();
        stats.edges_deleted += reclaim_ownership(store, &ctx.source_file, OWNED)?;

        let file_node = upsert_symbol_node(
            store,
            ctx,
            node_types::FILE,
            &ctx.source_file,
            vec![ctx.source_file.clone()],
            empty_metadata(),
        )?;
        stats.nodes_upserted += 1;

        let headings = ctx.queries.parse_and_run(ctx.language, "markdown-headings", &ctx.source)?;
        for heading in &headings {
            if let Some(text) = heading.capture("text") {
                upsert_symbol_node(
                    store,
                    ctx,
                    node_types::HEADING,
                    &text.text,
                    vec!["heading-symbol".to_string(), text.text.clone()],
                    empty_metadata(),
                )?;
                stats.nodes_upserted += 1;
            }
        }

        let links = ctx.queries.parse_and_run(ctx.language, "markdown-links", &ctx.source)?;
        for m in &links {
            let Some(destination) = m.capture("destination") else {
                continue;
            };
            self.emit_reference(store, ctx, file_node, &destination.text, false, &mut stats)?;
        }

        let images = ctx.queries.parse_and_run(ctx.language, "markdown-images", &ctx.source)?;
        for m in &images {
            let Some(destination) = m.capture("destination") else {
                continue;
            };
            self.emit_reference(store, ctx, file_node, &destination.text, true, &mut stats)?;
        }

        Ok(stats)
    }
}

impl MarkdownLinkExtractor {
    fn emit_reference(
        &self,
        store: &GraphStore,
        ctx: &ExtractionContext,
        file_node: codegraph_core::NodeId,
        destination: &str,
        is_image_node: bool,
        stats: &mut ExtractionStats,
    ) -> GraphResult<()> {
        if destination.is_empty() {
            return Ok(());
        }
        let kind = classify(destination, is_image_node);

        let target_node_type = match kind {
            LinkKind::Reference => node_types::HEADING,
            _ => node_types::UNKNOWN,
        };
        let target_tags = match kind {
            LinkKind::Reference => vec!["heading-symbol".to_string(), destination.trim_start_matches('#').to_string()],
            _ => vec!["link-target".to_string(), destination.to_string()],
        };

        let target_node = upsert_symbol_node(
            store,
            ctx,
            target_node_type,
            destination,
            target_tags,
            empty_metadata(),
        )?;
        stats.nodes_upserted += 1;

        let mut metadata = empty_metadata();
        metadata.insert("link_kind".to_string(), json!(kind.as_str()));
        metadata.insert("destination".to_string(), json!(destination));
        upsert_owned_edge(store, ctx, file_node, target_node, "references", metadata)?;
        stats.edges_upserted += 1;
        Ok(())
    }
}
