//! RDF-family score calculator.
//!
//! The family default is 4; a graph that parses, is non-empty, and
//! references at least one other resource earns 5. Parse failures keep the
//! default, so an RDF-family format never scores below 4.

use ingest_sniff::{parse_graph, FileFormat};

use crate::OpennessScore;

pub(crate) fn score_rdf(bytes: &[u8], format: FileFormat) -> OpennessScore {
    let base = crate::baseline(format);

    // JSON-LD and TriX are validated structurally at sniff time and have no
    // graph parser here; they keep the family default.
    let Some(syntax) = format.rdf_syntax() else {
        return base;
    };
    match parse_graph(bytes, syntax) {
        Ok(graph) if graph.triples > 0 && graph.has_resource_objects() => {
            OpennessScore::new(5).unwrap_or(base)
        }
        Ok(_) => base,
        Err(err) => {
            tracing::debug!(%err, "graph tier failed");
            base
        }
    }
}
