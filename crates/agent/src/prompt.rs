use rosterlink_core::arbitration::ArbitrationRequest;

pub const SYSTEM_PROMPT: &str = "You match business documents (meeting transcripts and form \
responses) to the client they belong to. You are given the account owner, one document and a \
list of candidate clients. Reply with exactly one JSON object and nothing else:\n\
{\"decision\": \"link\" | \"no_link\", \"clientId\": string | null, \"confidence\": number, \"reason\": string}\n\
Rules:\n\
- clientId must be copied verbatim from the candidate list, or null when decision is no_link.\n\
- confidence is between 0 and 1.\n\
- Choose no_link when the evidence is weak or more than one candidate fits.\n\
- The account owner is never the client.";

/// Render the user message. Candidates and document metadata are sent as
/// JSON so ids survive verbatim.
pub fn render_user_prompt(request: &ArbitrationRequest) -> String {
    let document = serde_json::to_string_pretty(&request.document)
        .unwrap_or_else(|_| format!("{{\"id\": \"{}\"}}", request.document.id));
    let candidates =
        serde_json::to_string_pretty(&request.candidates).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Account owner: {owner}\n\nDocument:\n{document}\n\nCandidate clients ({count}):\n{candidates}\n",
        owner = request.owner_email,
        count = request.candidates.len(),
    )
}
