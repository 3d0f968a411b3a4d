//! Hierarchical metadata resolution.
//!
//! # Responsibilities
//! - Collect each chain node's declaration, computing dynamic ones through
//!   the pass's request cache
//! - Merge root to leaf into one [`MetadataRecord`]
//!
//! # Design Decisions
//! - Fields: leaf wins per field, undeclared fields inherit
//! - Titles: a plain title gets the nearest strict-ancestor template; an
//!   absolute title ignores templates; a default is used as-is and
//!   inherited; a template only affects descendants

use futures_util::future::try_join_all;

use crate::metadata::record::{
    Metadata, MetadataContext, MetadataDecl, MetadataRecord, MetadataResolutionError, TitleDecl,
    TITLE_PLACEHOLDER,
};
use crate::render::fetch::RequestCache;
use crate::resolve::{MatchChain, Params};
use crate::tree::RouteTree;

#[derive(Debug, Clone, Copy)]
pub struct MetadataResolver<'t> {
    tree: &'t RouteTree,
}

impl<'t> MetadataResolver<'t> {
    pub fn new(tree: &'t RouteTree) -> Self {
        Self { tree }
    }

    pub async fn resolve(
        &self,
        chain: &MatchChain,
        cache: &RequestCache,
    ) -> Result<MetadataRecord, MetadataResolutionError> {
        let mut prefix = Params::new();
        let mut scopes = Vec::with_capacity(chain.len());
        for link in chain.links() {
            prefix.extend(link.params.iter().map(|(k, v)| (k.clone(), v.clone())));
            scopes.push((link.node, prefix.clone()));
        }

        let declared = scopes.iter().map(|(id, params)| {
            let node = self.tree.node(*id);
            async move {
                match &node.capabilities.resolve_metadata {
                    None => Ok(None),
                    Some(MetadataDecl::Static(metadata)) => Ok(Some(metadata.clone())),
                    Some(MetadataDecl::Dynamic(source)) => {
                        let ctx = MetadataContext {
                            params,
                            search: chain.search_params(),
                            cache,
                        };
                        source
                            .metadata(ctx)
                            .await
                            .map(Some)
                            .map_err(|source| MetadataResolutionError {
                                segment: node.folder.clone(),
                                source,
                            })
                    }
                }
            }
        });

        let declared = try_join_all(declared).await.inspect_err(|e| {
            tracing::warn!(segment = %e.segment, error = %e.source, "Metadata resolution failed");
        })?;
        Ok(merge(declared.iter().flatten()))
    }
}

/// Merge declarations ordered root to leaf.
pub fn merge<'a>(declarations: impl IntoIterator<Item = &'a Metadata>) -> MetadataRecord {
    let mut record = MetadataRecord::default();
    let mut template: Option<&str> = None;

    for decl in declarations {
        record
            .fields
            .extend(decl.fields.iter().map(|(k, v)| (k.clone(), v.clone())));

        match &decl.title {
            None => {}
            Some(TitleDecl::Plain(title)) => {
                record.title = match template {
                    Some(t) => t.replace(TITLE_PLACEHOLDER, title),
                    None => title.clone(),
                };
            }
            Some(TitleDecl::Structured(parts)) => {
                if let Some(absolute) = &parts.absolute {
                    record.title = absolute.clone();
                } else if let Some(default) = &parts.default {
                    record.title = default.clone();
                }
                // applies from the next level down
                if let Some(t) = &parts.template {
                    template = Some(t);
                }
            }
        }
    }
    record
}
