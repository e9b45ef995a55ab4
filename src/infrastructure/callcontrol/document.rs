//! Call-control document model and XML rendering
//!
//! A constrained dialect of the widely deployed call-control markup: a
//! `<Response>` wrapping speak / gather / record / dial / connect / hangup
//! verbs. Rendering is deterministic so documents can be asserted literally
//! in tests.

use std::fmt::Write;

/// One dialed leg inside a dial verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialNumber {
    /// E.164 destination
    pub number: String,
    /// Whisper callback, fetched for the callee before bridging
    pub url: Option<String>,
}

/// A single call-control instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Verb {
    Say {
        text: String,
    },
    Gather {
        action: String,
        num_digits: u32,
        timeout_seconds: u32,
        prompt: Option<String>,
    },
    Record {
        action: String,
        max_length_seconds: u32,
        play_beep: bool,
        trim_silence: bool,
    },
    Dial {
        action: String,
        timeout_seconds: u32,
        numbers: Vec<DialNumber>,
    },
    Connect {
        stream_url: String,
    },
    Hangup,
}

/// An ordered list of verbs; renders to the provider-facing XML body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    verbs: Vec<Verb>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// The empty "continue" document: no instruction, the call proceeds.
    pub fn proceed() -> Self {
        Self::new()
    }

    pub fn push(mut self, verb: Verb) -> Self {
        self.verbs.push(verb);
        self
    }

    pub fn say(self, text: &str) -> Self {
        self.push(Verb::Say {
            text: text.to_string(),
        })
    }

    pub fn hangup(self) -> Self {
        self.push(Verb::Hangup)
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    pub fn render(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>");
        for verb in &self.verbs {
            render_verb(&mut out, verb);
        }
        out.push_str("</Response>");
        out
    }
}

fn render_verb(out: &mut String, verb: &Verb) {
    match verb {
        Verb::Say { text } => {
            let _ = write!(out, "<Say>{}</Say>", escape(text));
        }
        Verb::Gather {
            action,
            num_digits,
            timeout_seconds,
            prompt,
        } => {
            let _ = write!(
                out,
                "<Gather action=\"{}\" method=\"POST\" numDigits=\"{}\" timeout=\"{}\">",
                escape(action),
                num_digits,
                timeout_seconds
            );
            if let Some(prompt) = prompt {
                let _ = write!(out, "<Say>{}</Say>", escape(prompt));
            }
            out.push_str("</Gather>");
        }
        Verb::Record {
            action,
            max_length_seconds,
            play_beep,
            trim_silence,
        } => {
            let _ = write!(
                out,
                "<Record action=\"{}\" method=\"POST\" maxLength=\"{}\" playBeep=\"{}\" trim=\"{}\"/>",
                escape(action),
                max_length_seconds,
                play_beep,
                if *trim_silence { "trim-silence" } else { "do-not-trim" }
            );
        }
        Verb::Dial {
            action,
            timeout_seconds,
            numbers,
        } => {
            let _ = write!(
                out,
                "<Dial action=\"{}\" method=\"POST\" timeout=\"{}\">",
                escape(action),
                timeout_seconds
            );
            for leg in numbers {
                match &leg.url {
                    Some(url) => {
                        let _ = write!(
                            out,
                            "<Number url=\"{}\">{}</Number>",
                            escape(url),
                            escape(&leg.number)
                        );
                    }
                    None => {
                        let _ = write!(out, "<Number>{}</Number>", escape(&leg.number));
                    }
                }
            }
            out.push_str("</Dial>");
        }
        Verb::Connect { stream_url } => {
            let _ = write!(
                out,
                "<Connect><Stream url=\"{}\"/></Connect>",
                escape(stream_url)
            );
        }
        Verb::Hangup => out.push_str("<Hangup/>"),
    }
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_renders_bare_response() {
        assert_eq!(
            Document::proceed().render(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>"
        );
    }

    #[test]
    fn test_say_and_hangup() {
        let doc = Document::new().say("Goodbye").hangup();
        assert_eq!(
            doc.render(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
             <Say>Goodbye</Say><Hangup/></Response>"
        );
    }

    #[test]
    fn test_text_is_escaped() {
        let doc = Document::new().say("Smith & Sons <est. 1900>");
        assert!(doc
            .render()
            .contains("<Say>Smith &amp; Sons &lt;est. 1900&gt;</Say>"));
    }

    #[test]
    fn test_dial_renders_each_leg_with_whisper() {
        let doc = Document::new().push(Verb::Dial {
            action: "https://example.com/action".to_string(),
            timeout_seconds: 20,
            numbers: vec![
                DialNumber {
                    number: "+14155550100".to_string(),
                    url: Some("https://example.com/whisper".to_string()),
                },
                DialNumber {
                    number: "+14155550101".to_string(),
                    url: None,
                },
            ],
        });
        let xml = doc.render();
        assert!(xml.contains(
            "<Dial action=\"https://example.com/action\" method=\"POST\" timeout=\"20\">"
        ));
        assert!(xml.contains("<Number url=\"https://example.com/whisper\">+14155550100</Number>"));
        assert!(xml.contains("<Number>+14155550101</Number>"));
    }

    #[test]
    fn test_connect_stream() {
        let doc = Document::new().push(Verb::Connect {
            stream_url: "wss://agent.example.com/join/abc".to_string(),
        });
        assert!(doc
            .render()
            .contains("<Connect><Stream url=\"wss://agent.example.com/join/abc\"/></Connect>"));
    }
}
