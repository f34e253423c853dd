// Discord-specific spam handling - converts gateway messages to core messages
// and hands them to the moderation engine.

use crate::core::moderation::{ChatMessage, ChatUser, EntityKind, MessageEntity};
use crate::discord::Data;
use poise::serenity_prelude as serenity;
use regex::Regex;
use std::sync::OnceLock;

/// Entity patterns, checked in order.
fn entity_patterns() -> &'static [(EntityKind, Regex)] {
    static PATTERNS: OnceLock<Vec<(EntityKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (EntityKind::Url, r"https?://[^\s<>()\[\]]+"),
            (
                EntityKind::Email,
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            ),
            (EntityKind::TextMention, r"<@!?\d+>"),
            (EntityKind::Mention, r"<@&\d+>|@everyone|@here"),
            (EntityKind::CustomEmoji, r"<a?:\w+:\d+>"),
        ]
        .into_iter()
        .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("static entity pattern")))
        .collect()
    })
}

fn masked_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[[^\]]+\]\(<?https?://[^\s)]+>?\)").expect("static masked link pattern")
    })
}

/// Find links, mentions, e-mails and custom emoji in message content.
///
/// Discord does not send entity offsets, so they are recovered from the
/// markdown. A URL inside a masked link counts once, as the masked link.
pub fn extract_entities(content: &str) -> Vec<MessageEntity> {
    let masked: Vec<(usize, usize)> = masked_link_pattern()
        .find_iter(content)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut entities: Vec<MessageEntity> = masked
        .iter()
        .map(|&(start, end)| MessageEntity {
            kind: EntityKind::TextLink,
            offset: start,
            length: end - start,
        })
        .collect();

    for (kind, pattern) in entity_patterns() {
        for m in pattern.find_iter(content) {
            let inside_masked = masked
                .iter()
                .any(|&(start, end)| m.start() >= start && m.end() <= end);
            if inside_masked {
                continue;
            }
            entities.push(MessageEntity {
                kind: *kind,
                offset: m.start(),
                length: m.len(),
            });
        }
    }

    entities.sort_by_key(|e| e.offset);
    entities
}

fn convert(msg: &serenity::Message, include_reply: bool) -> ChatMessage {
    let caption: Vec<String> = msg
        .attachments
        .iter()
        .filter_map(|a| a.description.clone())
        .collect();

    ChatMessage {
        id: msg.id.get() as i64,
        conversation_id: msg.channel_id.get() as i64,
        sender: ChatUser {
            id: msg.author.id.get() as i64,
            username: msg.author.name.clone(),
            is_bot: msg.author.bot,
        },
        text: msg.content.clone(),
        caption: if caption.is_empty() {
            None
        } else {
            Some(caption.join("\n"))
        },
        entities: extract_entities(&msg.content),
        reply_to: if include_reply {
            msg.referenced_message
                .as_deref()
                .map(|reply| Box::new(convert(reply, false)))
        } else {
            None
        },
        is_forward: msg
            .flags
            .is_some_and(|flags| flags.contains(serenity::MessageFlags::IS_CROSSPOST)),
        link: Some(msg.link()),
    }
}

/// Convert a gateway message into the core message model.
pub fn to_chat_message(msg: &serenity::Message) -> ChatMessage {
    convert(msg, true)
}

/// Run a guild message through the moderation engine.
pub async fn handle_message_for_spam(msg: &serenity::Message, data: &Data) {
    // Only check guild messages
    if msg.guild_id.is_none() {
        return;
    }

    let message = to_chat_message(msg);
    let outcome = data.engine.handle_message(&message).await;

    if let Some(filter) = outcome.stopped_by {
        tracing::info!(
            user_id = message.sender.id,
            channel_id = message.conversation_id,
            filter = %filter,
            "Message handled by moderation filter"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(content: &str) -> Vec<EntityKind> {
        extract_entities(content).into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_finds_urls_and_mentions() {
        assert_eq!(
            kinds("hey <@123> visit https://spam.example/x now @everyone"),
            vec![EntityKind::TextMention, EntityKind::Url, EntityKind::Mention]
        );
    }

    #[test]
    fn test_masked_link_counted_once() {
        let entities = extract_entities("[free nitro](https://scam.example/gift)");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind, EntityKind::TextLink);
        assert_eq!(entities[0].offset, 0);
    }

    #[test]
    fn test_custom_emoji_and_email() {
        assert_eq!(
            kinds("<:pog:111> <a:dance:222> mail me at a.b@example.com"),
            vec![
                EntityKind::CustomEmoji,
                EntityKind::CustomEmoji,
                EntityKind::Email
            ]
        );
    }

    #[test]
    fn test_plain_text_has_no_entities() {
        assert!(extract_entities("just chatting :)").is_empty());
    }
}
