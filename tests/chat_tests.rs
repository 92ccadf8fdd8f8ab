use dot_voice::{ChatConfig, ChatEvent, ChatMessage, ChatRole, GroundingLink, ReplyAccumulator};

fn link(title: &str, uri: &str) -> GroundingLink {
    GroundingLink {
        title: title.to_string(),
        uri: uri.to_string(),
    }
}

#[test]
fn test_deltas_concatenate_in_order() {
    let mut reply = ReplyAccumulator::new();
    reply.push(ChatEvent::TextDelta("The mitochondria ".to_string()));
    reply.push(ChatEvent::TextDelta("is the powerhouse ".to_string()));
    reply.push(ChatEvent::TextDelta("of the cell.".to_string()));

    assert_eq!(reply.text(), "The mitochondria is the powerhouse of the cell.");
}

#[test]
fn test_grounding_links_dedup_by_uri() {
    let mut reply = ReplyAccumulator::new();
    reply.push(ChatEvent::Grounding(vec![
        link("Cell biology", "https://example.org/cells"),
        link("Mitochondria", "https://example.org/mito"),
    ]));
    reply.push(ChatEvent::Grounding(vec![
        // Same URI under a different title: first title wins
        link("Cells (mirror)", "https://example.org/cells"),
        link("ATP", "https://example.org/atp"),
    ]));

    let links = reply.links();
    assert_eq!(links.len(), 3);
    assert_eq!(links[0].title, "Cell biology");
    assert_eq!(links[1].uri, "https://example.org/mito");
    assert_eq!(links[2].uri, "https://example.org/atp");
}

#[test]
fn test_links_without_uri_are_dropped() {
    let mut reply = ReplyAccumulator::new();
    reply.push(ChatEvent::Grounding(vec![link("Source", "")]));

    assert!(reply.links().is_empty());
}

#[test]
fn test_finish_produces_complete_reply() {
    let mut reply = ReplyAccumulator::new();
    reply.push(ChatEvent::TextDelta("Answer".to_string()));
    reply.push(ChatEvent::Grounding(vec![link("Ref", "https://example.org")]));

    let reply = reply.finish();
    assert_eq!(reply.full_text, "Answer");
    assert_eq!(reply.grounding_links.len(), 1);
}

#[test]
fn test_chat_roles_serialize_lowercase() {
    let msg = ChatMessage::user("What is osmosis?");
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"role\":\"user\""));

    let msg = ChatMessage::model("Osmosis is...");
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"role\":\"model\""));

    let parsed: ChatMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.role, ChatRole::Model);
}

#[test]
fn test_chat_config_defaults() {
    let config = ChatConfig::default();
    assert!(config.thinking_budget.is_none());
    assert!(!config.use_search);
    assert!(config.system_instruction.is_none());
}
