use tracing::error;

use crate::embedding::Embedder;
use crate::extractor::PdfExtractor;
use crate::llm::LlmClient;
use crate::models::{ChatReply, ChatTurn, Role, SourceRef};
use crate::processor::DocumentProcessor;

pub const DEFAULT_TOP_K: usize = 5;

/// Reply used when retrieval finds nothing; no model call is made.
pub const NO_CONTEXT_REPLY: &str = "I'm sorry, I couldn't find any relevant information in the \
     compliance documents. Please consider uploading relevant PDFs if they're not already in \
     our system.";

/// Reply used when the completion model fails.
pub const MODEL_FAILURE_REPLY: &str =
    "I'm sorry, I encountered an error while generating a response. Please try again later.";

// 10 exchanges, two entries each.
const MAX_TRANSCRIPT_ENTRIES: usize = 20;

/// Turns a user query plus retrieved context into a grounded, cited answer.
///
/// Citations are structural: they list the chunks retrieval returned, never
/// anything parsed out of the model's text.
pub struct ChatEngine<L> {
    llm: L,
    transcript: Vec<ChatTurn>,
}

impl<L: LlmClient> ChatEngine<L> {
    pub fn new(llm: L) -> Self {
        Self {
            llm,
            transcript: Vec::new(),
        }
    }

    pub async fn respond<E, X>(
        &mut self,
        processor: &DocumentProcessor<E, X>,
        query: &str,
    ) -> ChatReply
    where
        E: Embedder,
        X: PdfExtractor,
    {
        let hits = processor.search(query, DEFAULT_TOP_K).await;

        if hits.is_empty() {
            return ChatReply {
                answer: NO_CONTEXT_REPLY.to_string(),
                sources: Vec::new(),
            };
        }

        let context = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let sources: Vec<SourceRef> = hits
            .iter()
            .map(|hit| SourceRef {
                source: hit.source.clone(),
                score: hit.score,
                doc_id: hit.doc_id.clone(),
            })
            .collect();

        match self.llm.complete(&build_prompt(query, &context)).await {
            Ok(answer) => {
                self.record_exchange(query, &answer);
                ChatReply { answer, sources }
            }
            Err(err) => {
                error!(%err, "completion failed");
                ChatReply {
                    answer: MODEL_FAILURE_REPLY.to_string(),
                    sources: Vec::new(),
                }
            }
        }
    }

    pub fn reset_history(&mut self) {
        self.transcript.clear();
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    fn record_exchange(&mut self, query: &str, answer: &str) {
        self.transcript.push(ChatTurn {
            role: Role::User,
            content: query.to_string(),
        });
        self.transcript.push(ChatTurn {
            role: Role::Assistant,
            content: answer.to_string(),
        });

        if self.transcript.len() > MAX_TRANSCRIPT_ENTRIES {
            let excess = self.transcript.len() - MAX_TRANSCRIPT_ENTRIES;
            self.transcript.drain(..excess);
        }
    }
}

fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "You are a compliance assistant for a financial institution. Answer the user's \
         question using ONLY the information in the context below. If the context does not \
         contain the answer, say that you don't have enough information from the compliance \
         documents. Do not make up answers. Always name the specific document your answer \
         comes from.\n\n\
         Context from compliance documents:\n{context}\n\n\
         User question: {query}\n\n\
         Answer based only on the context above:"
    )
}
