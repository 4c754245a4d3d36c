//! RDF parsing shared by the sniffing cascade and the score calculators.
//!
//! A probe only succeeds when the whole buffer parses and the resulting
//! graph holds at least one triple; partially-valid input never wins.

use oxrdf::Term;

use crate::format::RdfSyntax;

/// Summary of a successfully parsed graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphSummary {
    /// Number of parsed triples (quads count as triples here).
    pub triples: usize,
    /// Number of triples whose object is a named node, i.e. a reference to
    /// another resource rather than a literal.
    pub resource_objects: usize,
}

impl GraphSummary {
    /// Linked-data indicator: the graph references at least one resource.
    pub fn has_resource_objects(&self) -> bool {
        self.resource_objects > 0
    }
}

/// Parse error carrying the failing syntax for diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("not valid {syntax:?}: {message}")]
pub struct RdfParseError {
    pub syntax: RdfSyntax,
    pub message: String,
}

/// Parse the entire buffer with the given syntax.
///
/// Every triple must parse; the first malformed statement fails the whole
/// buffer. An empty graph is returned as `Ok` with zero triples — callers
/// decide whether empty counts as a miss.
pub fn parse_graph(bytes: &[u8], syntax: RdfSyntax) -> Result<GraphSummary, RdfParseError> {
    let fail = |message: String| RdfParseError { syntax, message };

    let mut triples = 0usize;
    let mut resource_objects = 0usize;
    let mut tally = |object_is_named: bool| {
        triples += 1;
        if object_is_named {
            resource_objects += 1;
        }
    };

    match syntax {
        RdfSyntax::Turtle => {
            for triple in oxttl::TurtleParser::new().for_reader(bytes) {
                let triple = triple.map_err(|e| fail(e.to_string()))?;
                tally(matches!(triple.object, Term::NamedNode(_)));
            }
        }
        RdfSyntax::NTriples => {
            for triple in oxttl::NTriplesParser::new().for_reader(bytes) {
                let triple = triple.map_err(|e| fail(e.to_string()))?;
                tally(matches!(triple.object, Term::NamedNode(_)));
            }
        }
        RdfSyntax::NQuads => {
            for quad in oxttl::NQuadsParser::new().for_reader(bytes) {
                let quad = quad.map_err(|e| fail(e.to_string()))?;
                tally(matches!(quad.object, Term::NamedNode(_)));
            }
        }
        RdfSyntax::TriG => {
            for quad in oxttl::TriGParser::new().for_reader(bytes) {
                let quad = quad.map_err(|e| fail(e.to_string()))?;
                tally(matches!(quad.object, Term::NamedNode(_)));
            }
        }
        RdfSyntax::N3 => {
            use oxttl::n3::N3Term;
            for quad in oxttl::N3Parser::new().for_reader(bytes) {
                let quad = quad.map_err(|e| fail(e.to_string()))?;
                tally(matches!(quad.object, N3Term::NamedNode(_)));
            }
        }
        RdfSyntax::RdfXml => {
            for triple in oxrdfxml::RdfXmlParser::new().for_reader(bytes) {
                let triple = triple.map_err(|e| fail(e.to_string()))?;
                tally(matches!(triple.object, Term::NamedNode(_)));
            }
        }
    }

    Ok(GraphSummary {
        triples,
        resource_objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TURTLE: &[u8] = b"@prefix ex: <http://example.com/> .\n\
        ex:a ex:knows ex:b .\n\
        ex:a ex:name \"alpha\" .\n";

    #[test]
    fn test_turtle_counts_resource_objects() {
        let summary = parse_graph(TURTLE, RdfSyntax::Turtle).unwrap();
        assert_eq!(summary.triples, 2);
        assert_eq!(summary.resource_objects, 1);
        assert!(summary.has_resource_objects());
    }

    #[test]
    fn test_ntriples_literal_only() {
        let nt = b"<http://example.com/a> <http://example.com/name> \"alpha\" .\n";
        let summary = parse_graph(nt, RdfSyntax::NTriples).unwrap();
        assert_eq!(summary.triples, 1);
        assert!(!summary.has_resource_objects());
    }

    #[test]
    fn test_malformed_fails_whole_buffer() {
        let bad = b"<http://example.com/a> <http://example.com/p> <http://example.com/b> .\n\
            this line is not a triple\n";
        assert!(parse_graph(bad, RdfSyntax::NTriples).is_err());
    }

    #[test]
    fn test_csv_is_not_turtle() {
        assert!(parse_graph(b"a,b,c\n1,2,3\n", RdfSyntax::Turtle).is_err());
    }

    #[test]
    fn test_empty_graph_is_ok_with_zero_triples() {
        let summary = parse_graph(b"", RdfSyntax::Turtle).unwrap();
        assert_eq!(summary.triples, 0);
    }

    #[test]
    fn test_rdfxml_graph() {
        let rdf = br#"<?xml version="1.0"?>
            <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                     xmlns:ex="http://example.com/">
              <rdf:Description rdf:about="http://example.com/a">
                <ex:knows rdf:resource="http://example.com/b"/>
              </rdf:Description>
            </rdf:RDF>"#;
        let summary = parse_graph(rdf, RdfSyntax::RdfXml).unwrap();
        assert_eq!(summary.triples, 1);
        assert!(summary.has_resource_objects());
    }
}
