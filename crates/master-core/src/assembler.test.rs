use std::collections::HashMap;

use serde_json::json;

use super::*;

fn client(email: &str) -> serde_json::Value {
    json!({"id": format!("uuid-{email}"), "email": email, "enable": true})
}

#[test]
fn disabled_clients_are_dropped() {
    let mut clients = vec![client("on@x"), client("off@x")];
    let effective = HashMap::from([("on@x".to_string(), true), ("off@x".to_string(), false)]);

    filter_disabled_clients(&mut clients, &effective);

    let emails: Vec<&str> = clients.iter().map(|c| c["email"].as_str().unwrap()).collect();
    assert_eq!(emails, vec!["on@x"]);
}

#[test]
fn clients_without_email_or_traffic_row_pass_through() {
    let mut clients = vec![
        json!({"id": "keyed-by-uuid"}),
        json!({"id": "empty-email", "email": ""}),
        client("unknown@x"),
    ];
    let effective = HashMap::new();

    filter_disabled_clients(&mut clients, &effective);
    assert_eq!(clients.len(), 3);
}

#[test]
fn rendered_block_defaults_listen_and_keeps_tag() {
    let inbound = fb_types::Inbound {
        id: 10,
        slave_id: 1,
        up: 0,
        down: 0,
        total: 0,
        all_time: 0,
        remark: String::new(),
        enable: true,
        expiry_time: 0,
        traffic_reset: "never".to_string(),
        last_traffic_reset_time: 0,
        listen: String::new(),
        port: 443,
        protocol: "vless".to_string(),
        settings: json!({"clients": [client("u@x")], "decryption": "none"}).to_string(),
        stream_settings: json!({"network": "tcp"}).to_string(),
        tag: "i10".to_string(),
        sniffing: String::new(),
    };
    let effective = HashMap::from([("u@x".to_string(), false)]);

    let block = render_inbound(&inbound, &effective).unwrap();
    assert_eq!(block["listen"], "0.0.0.0");
    assert_eq!(block["tag"], "i10");
    assert_eq!(block["streamSettings"]["network"], "tcp");
    // Non-client settings survive the filter; the disabled client does not.
    assert_eq!(block["settings"]["decryption"], "none");
    assert_eq!(block["settings"]["clients"].as_array().unwrap().len(), 0);
    assert!(block.get("sniffing").is_none());
}

#[test]
fn malformed_settings_are_an_invalid_error() {
    let inbound = fb_types::Inbound {
        id: 1,
        slave_id: 1,
        up: 0,
        down: 0,
        total: 0,
        all_time: 0,
        remark: String::new(),
        enable: true,
        expiry_time: 0,
        traffic_reset: "never".to_string(),
        last_traffic_reset_time: 0,
        listen: String::new(),
        port: 1,
        protocol: "vmess".to_string(),
        settings: "{not json".to_string(),
        stream_settings: String::new(),
        tag: "broken".to_string(),
        sniffing: String::new(),
    };

    let err = render_inbound(&inbound, &HashMap::new()).unwrap_err();
    assert!(matches!(err, MasterError::Invalid(_)));
}
