//! Snapshot and property tests for the indexing pipeline

#[cfg(test)]
mod snapshot_tests {
    use crate::{
        Chunk, Embedder, HashingEmbedder, IndexBuilder, IndexingConfig, Record, RecursiveChunker,
        VectorIndex,
    };
    use insta::assert_yaml_snapshot;
    use std::sync::Arc;

    #[test]
    fn test_chunk_boundaries_snapshot() {
        let chunker = RecursiveChunker::new(40, 10).unwrap();
        let narrative = "i disputed a charge on my credit card.\n\
                         the bank said it would investigate.\n\n\
                         two months later the charge is still there and interest keeps growing.";

        assert_yaml_snapshot!(chunker.split_text(narrative), @r###"
        ---
        - i disputed a charge on my credit card.
        - the bank said it would investigate.
        - two months later the charge is still
        - is still there and interest keeps
        - keeps growing.
        "###);
    }

    #[test]
    fn test_credit_card_scenario_top_result() {
        let embedder = HashingEmbedder::new(384).unwrap();
        let mut index = VectorIndex::new(embedder.fingerprint());
        let corpus = [
            ("1", "My credit card was charged twice"),
            ("2", "Savings account interest rate is too low"),
        ];
        for (id, text) in corpus {
            let record = Record::new(id, "Credit card", "", text);
            index
                .insert(Chunk::from_record(&record, text), embedder.embed_one(text).unwrap())
                .unwrap();
        }

        let query = embedder.embed_one("credit card double charge").unwrap();
        let hits = index.search(&query, 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.record_id, "1");
    }

    #[test]
    fn test_indexed_chunk_is_its_own_top_hit() {
        let embedder = Arc::new(HashingEmbedder::new(256).unwrap());
        let records: Vec<Record> = [
            ("10", "Credit card", "the store card charged a late fee after autopay failed"),
            ("11", "Money transfers", "the wire transfer to my family never arrived"),
            ("12", "Personal loan", "the lender reported a missed payment that i made on time"),
            ("13", "Savings account", "the bank closed my savings account without any notice"),
        ]
        .into_iter()
        .map(|(id, category, text)| Record::new(id, category, "", text))
        .collect();

        let config = IndexingConfig {
            embedding_dimension: 256,
            ..IndexingConfig::default()
        };
        let built = IndexBuilder::with_config(embedder.clone(), config)
            .build_in_memory(&records)
            .unwrap();

        for entry in built.index.entries() {
            let query = embedder.embed_one(&entry.chunk.text).unwrap();
            let hits = built.index.search(&query, 1).unwrap();
            assert_eq!(hits[0].chunk, entry.chunk);
        }
    }

    #[test]
    fn test_search_returns_k_distinct_sorted_hits() {
        let embedder = HashingEmbedder::new(128).unwrap();
        let mut index = VectorIndex::new(embedder.fingerprint());
        let texts = [
            "late fee on credit card",
            "credit card interest",
            "wire transfer delayed",
            "loan payment misapplied",
            "atm withdrawal failed",
            "credit limit lowered",
        ];
        for (i, text) in texts.iter().enumerate() {
            let record = Record::new(i.to_string(), "Credit card", "", *text);
            index
                .insert(Chunk::from_record(&record, *text), embedder.embed_one(text).unwrap())
                .unwrap();
        }

        let query = embedder.embed_one("credit card fee").unwrap();
        let hits = index.search(&query, 4).unwrap();
        assert_eq!(hits.len(), 4);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        let mut ids: Vec<&str> = hits.iter().map(|h| h.chunk.record_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }
}
