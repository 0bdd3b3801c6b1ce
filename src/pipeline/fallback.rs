use serde_json::Value;

/// Deterministic, template-based presentation of a tool payload. Used when
/// the model cannot be asked (or fails) to format the data itself; the
/// pipeline must never block delivery of already-obtained data on the model.
pub fn format_report(capability: &str, data: &Value) -> String {
    let mut out = String::from("I found the following information about your IP address:\n\n");
    let mut wrote_section = false;

    if capability == "basic" || capability == "geo" {
        wrote_section = true;
        out.push_str(&format!(
            "📍 **Location**: {}, {}, {}\n",
            field(data, "city"),
            field(data, "region"),
            field(data, "country")
        ));
        out.push_str(&format!("🌐 **IP Address**: {}\n", field(data, "ip")));
        if let Some(hostname) = data.get("hostname").and_then(Value::as_str) {
            if !hostname.is_empty() {
                out.push_str(&format!("🖥️ **Hostname**: {hostname}\n"));
            }
        }
        if let Some(loc) = data.get("loc").and_then(Value::as_str) {
            out.push_str(&format!("🗺️ **Coordinates**: {loc}\n"));
        }
        if let Some(timezone) = data.get("timezone").and_then(Value::as_str) {
            out.push_str(&format!("⏰ **Timezone**: {timezone}\n"));
        }
        if let Some(postal) = data.get("postal").and_then(Value::as_str) {
            out.push_str(&format!("📮 **Postal Code**: {postal}\n"));
        }
    }

    if capability == "basic" || capability == "asn" {
        wrote_section = true;
        out.push_str(&format!("🔌 **Network Provider**: {}\n", field(data, "org")));
        if let Some(asn) = data.get("asn") {
            out.push_str(&format!("🌐 **ASN**: {}\n", asn_display(asn)));
        }
    }

    if !wrote_section {
        // Unfamiliar capability: show the raw payload rather than nothing.
        let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        return format!("I retrieved the following data:\n\n```json\n{pretty}\n```");
    }

    out
}

/// Deterministic summary of a tool payload, with the security framing the
/// assistant always closes on.
pub fn summarize_report(capability: &str, data: &Value) -> String {
    let mut out = String::from("Based on the information I gathered, here's what I can tell you:\n\n");
    let mut wrote_section = false;

    if capability == "basic" || capability == "geo" {
        wrote_section = true;
        out.push_str(&format!(
            "You're currently connecting from **{}, {}, {}** with the IP address **{}**. ",
            field(data, "city"),
            field(data, "region"),
            field(data, "country"),
            field(data, "ip")
        ));
        if let Some(timezone) = data.get("timezone").and_then(Value::as_str) {
            out.push_str(&format!("Your local timezone is **{timezone}**. "));
        }
    }

    if capability == "basic" || capability == "asn" {
        wrote_section = true;
        let org = field(data, "org");
        // "AS7922 Comcast Cable Communications, LLC" -> provider + ASN
        if let Some((asn_num, isp_name)) = org
            .split_once(' ')
            .filter(|(prefix, _)| prefix.starts_with("AS"))
        {
            out.push_str(&format!(
                "Your internet connection is provided by **{isp_name}** (ASN: {asn_num}). "
            ));
        } else {
            out.push_str(&format!("Your internet service provider is **{org}**. "));
        }
    }

    if !wrote_section {
        let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        out.push_str(&format!("The tool returned:\n\n```json\n{pretty}\n```"));
        return out;
    }

    out.push_str(
        "\n\nThis information is what websites can see when you connect to them. \
         Using a VPN can help mask this information if privacy is a concern.",
    );
    out
}

fn field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("Unknown")
}

fn asn_display(asn: &Value) -> String {
    match asn {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("asn")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string(),
        other => other.to_string(),
    }
}
