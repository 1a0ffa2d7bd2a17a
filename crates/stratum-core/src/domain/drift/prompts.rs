//! Prompt text and fixed messages for DRIFT

/// Final answer when no community matched the question
pub const NO_CONTEXT_MESSAGE: &str =
    "No relevant community context was found in the knowledge base for this question.";

/// Stands in for the follow-up list when no follow-up ran
pub const NO_FOLLOW_UPS_PLACEHOLDER: &str = "No follow-up investigations were performed.";

pub const HYDE_SYSTEM_PROMPT: &str = "You write hypothetical community reports. Given a \
question, write a short report in the style of a knowledge-base community summary that \
would plausibly contain the answer. Do not try to answer correctly; the report is only \
used to find similar real reports. If an example report is provided, imitate its style \
and length. Respond with JSON only.";

pub const PRIMER_SYSTEM_PROMPT: &str = "You answer questions from community reports of a \
knowledge base. Using only the provided reports, give a broad initial answer, a \
confidence between 0 and 1, and two to four follow-up questions that would let a \
researcher drill into specifics the reports only touch on. Respond with JSON only.";

pub const FOLLOW_UP_SYSTEM_PROMPT: &str = "You investigate one follow-up question about a \
knowledge base. Use the provided local context (concepts with descriptions and the \
relationships between them) and the prior findings. Give a detailed answer, up to two \
additional questions worth asking, and whether further investigation would add value. \
Respond with JSON only.";

pub const SYNTHESIS_SYSTEM_PROMPT: &str = "You combine research findings into a final \
answer. Given the original question, an initial broad answer and the answers to \
follow-up investigations, write one coherent, complete answer. Prefer specific findings \
over general statements and do not invent facts. Respond with JSON only.";
