//! XML score calculator.
//!
//! Tiered promotion: well-formed XML earns 3, full namespace qualification
//! earns 4, and a valid RDF/XML graph with resource references earns 5.
//! A tier is only attempted after every lower tier passed.

use ingest_sniff::{parse_graph, RdfSyntax};

use crate::OpennessScore;

pub(crate) fn score_xml(bytes: &[u8]) -> OpennessScore {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return OpennessScore::FLOOR,
    };
    let doc = match roxmltree::Document::parse(text) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::debug!(%err, "xml tier failed");
            return OpennessScore::FLOOR;
        }
    };

    let mut best = 3;
    if fully_qualified(&doc) {
        best = 4;
        match parse_graph(bytes, RdfSyntax::RdfXml) {
            Ok(graph) if graph.triples > 0 && graph.has_resource_objects() => best = 5,
            Ok(_) => {}
            Err(err) => tracing::debug!(%err, "rdf tier failed"),
        }
    }
    OpennessScore::new(best).unwrap_or(OpennessScore::FLOOR)
}

/// True when the document declares at least one namespace and every
/// element's qualified name resolves within one; unqualified mixing fails.
fn fully_qualified(doc: &roxmltree::Document<'_>) -> bool {
    let mut saw_element = false;
    for node in doc.descendants().filter(|n| n.is_element()) {
        saw_element = true;
        if node.tag_name().namespace().is_none() {
            return false;
        }
    }
    saw_element
}
