use pumpkin_util::text::{TextComponent, color::NamedColor};

pub fn prefix() -> TextComponent {
    TextComponent::text("JinxEssentials")
        .color_named(NamedColor::Gold)
        .bold()
        .add_child(TextComponent::text(" » ").color_named(NamedColor::DarkGray))
}

pub fn brand(message: TextComponent) -> TextComponent {
    prefix().add_child(message)
}

pub fn info(message: impl Into<String>) -> TextComponent {
    brand(TextComponent::text(message.into()).color_named(NamedColor::Yellow))
}

pub fn success(message: impl Into<String>) -> TextComponent {
    brand(TextComponent::text(message.into()).color_named(NamedColor::Green))
}

pub fn failure(message: impl Into<String>) -> TextComponent {
    brand(TextComponent::text(message.into()).color_named(NamedColor::Red))
}

/// Error text as a sentence: first letter upper-cased, trailing period.
pub fn sentence(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}
