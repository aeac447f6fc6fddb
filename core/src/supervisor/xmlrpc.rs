//! Minimal XML-RPC codec covering the subset the supervisor daemon speaks:
//! scalar params, and responses made of scalars, arrays, and structs.

use std::fmt::Write as _;

/// XML-RPC value tree. Responses are converted to JSON for serde-based
/// extraction on the caller side.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Int(i64),
    Bool(bool),
    Double(f64),
    Str(String),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum XmlRpcError {
    /// Remote-side failure reported through the protocol's fault envelope.
    #[error("fault {code}: {message}")]
    Fault { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub(crate) fn encode_call(method: &str, params: &[Value]) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\"?>\n");
    xml.push_str("<methodCall><methodName>");
    xml.push_str(&escape(method));
    xml.push_str("</methodName><params>");
    for param in params {
        xml.push_str("<param>");
        encode_value(&mut xml, param);
        xml.push_str("</param>");
    }
    xml.push_str("</params></methodCall>");
    xml
}

fn encode_value(xml: &mut String, value: &Value) {
    xml.push_str("<value>");
    match value {
        Value::Int(v) => {
            let _ = write!(xml, "<int>{v}</int>");
        }
        Value::Bool(v) => {
            let _ = write!(xml, "<boolean>{}</boolean>", i32::from(*v));
        }
        Value::Double(v) => {
            let _ = write!(xml, "<double>{v}</double>");
        }
        Value::Str(v) => {
            let _ = write!(xml, "<string>{}</string>", escape(v));
        }
        Value::Array(items) => {
            xml.push_str("<array><data>");
            for item in items {
                encode_value(xml, item);
            }
            xml.push_str("</data></array>");
        }
        Value::Struct(members) => {
            xml.push_str("<struct>");
            for (name, member) in members {
                xml.push_str("<member><name>");
                xml.push_str(&escape(name));
                xml.push_str("</name>");
                encode_value(xml, member);
                xml.push_str("</member>");
            }
            xml.push_str("</struct>");
        }
    }
    xml.push_str("</value>");
}

/// Parses a `<methodResponse>` body. A `<fault>` envelope becomes
/// [`XmlRpcError::Fault`]; otherwise the single `<param>` value is returned.
pub(crate) fn parse_response(body: &str) -> Result<Value, XmlRpcError> {
    let mut parser = Parser::new(body);
    parser.skip_prolog();
    parser.expect_open("methodResponse")?;
    if parser.try_open("fault") {
        let value = parser.parse_value()?;
        parser.expect_close("fault")?;
        return Err(fault_from(value));
    }
    parser.expect_open("params")?;
    parser.expect_open("param")?;
    let value = parser.parse_value()?;
    parser.expect_close("param")?;
    parser.expect_close("params")?;
    Ok(value)
}

fn fault_from(value: Value) -> XmlRpcError {
    let mut code = 0;
    let mut message = String::new();
    if let Value::Struct(members) = value {
        for (name, member) in members {
            match (name.as_str(), member) {
                ("faultCode", Value::Int(v)) => code = v,
                ("faultString", Value::Str(v)) => message = v,
                _ => {}
            }
        }
    }
    XmlRpcError::Fault { code, message }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Int(v) => serde_json::Value::from(v),
            Value::Bool(v) => serde_json::Value::from(v),
            Value::Double(v) => serde_json::Value::from(v),
            Value::Str(v) => serde_json::Value::from(v),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Struct(members) => serde_json::Value::Object(
                members
                    .into_iter()
                    .map(|(name, member)| (name, member.into()))
                    .collect(),
            ),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn skip_prolog(&mut self) {
        self.skip_ws();
        if self.rest().starts_with("<?") {
            if let Some(end) = self.rest().find("?>") {
                self.pos += end + 2;
            }
        }
    }

    /// Consumes `<tag>` if it is next; the daemon never emits attributes.
    fn try_open(&mut self, tag: &str) -> bool {
        self.skip_ws();
        let opening = format!("<{tag}>");
        if self.rest().starts_with(&opening) {
            self.pos += opening.len();
            true
        } else {
            false
        }
    }

    fn expect_open(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        if self.try_open(tag) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("<{tag}>")))
        }
    }

    fn expect_close(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        self.skip_ws();
        let closing = format!("</{tag}>");
        if self.rest().starts_with(&closing) {
            self.pos += closing.len();
            Ok(())
        } else {
            Err(self.unexpected(&closing))
        }
    }

    fn text_until_close(&mut self, tag: &str) -> Result<String, XmlRpcError> {
        let closing = format!("</{tag}>");
        match self.rest().find(&closing) {
            Some(end) => {
                let text = &self.rest()[..end];
                self.pos += end + closing.len();
                Ok(unescape(text))
            }
            None => Err(self.unexpected(&closing)),
        }
    }

    fn parse_value(&mut self) -> Result<Value, XmlRpcError> {
        self.expect_open("value")?;
        self.skip_ws();
        let value = if self.try_open("int") {
            self.parse_int("int")?
        } else if self.try_open("i4") {
            self.parse_int("i4")?
        } else if self.try_open("boolean") {
            let text = self.text_until_close("boolean")?;
            Value::Bool(text.trim() == "1")
        } else if self.try_open("double") {
            let text = self.text_until_close("double")?;
            let parsed = text
                .trim()
                .parse::<f64>()
                .map_err(|_| self.unexpected("a double"))?;
            Value::Double(parsed)
        } else if self.try_open("string") {
            Value::Str(self.text_until_close("string")?)
        } else if self.try_open("array") {
            self.expect_open("data")?;
            let mut items = Vec::new();
            loop {
                self.skip_ws();
                if !self.rest().starts_with("<value>") {
                    break;
                }
                items.push(self.parse_value()?);
            }
            self.expect_close("data")?;
            self.expect_close("array")?;
            Value::Array(items)
        } else if self.try_open("struct") {
            let mut members = Vec::new();
            while self.try_open("member") {
                self.expect_open("name")?;
                let name = self.text_until_close("name")?;
                let member = self.parse_value()?;
                self.expect_close("member")?;
                members.push((name, member));
            }
            self.expect_close("struct")?;
            Value::Struct(members)
        } else {
            // A bare <value>text</value> is an implicit string; the closing
            // tag is consumed with the text, so return directly.
            return Ok(Value::Str(self.text_until_close("value")?));
        };
        self.expect_close("value")?;
        Ok(value)
    }

    fn parse_int(&mut self, tag: &str) -> Result<Value, XmlRpcError> {
        let text = self.text_until_close(tag)?;
        let parsed = text
            .trim()
            .parse::<i64>()
            .map_err(|_| self.unexpected("an integer"))?;
        Ok(Value::Int(parsed))
    }

    fn unexpected(&self, wanted: &str) -> XmlRpcError {
        let context: String = self.rest().chars().take(40).collect();
        XmlRpcError::Malformed(format!("expected {wanted} at: {context:?}"))
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
