pub mod vision; // Leaf preprocessing + classification
pub mod storage; // Knowledge base: chunking, embeddings, SQLite vectors
pub mod rag; // Symptom Q&A over the knowledge base
