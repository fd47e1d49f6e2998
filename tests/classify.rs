//! Classifier Integration Tests
//!
//! Properties of text classification and file extension matching.

use vpnscan::core::{classify, match_extension};
use vpnscan::domain::Settings;

fn all_types() -> Vec<String> {
    Settings::default().enabled_server_types().to_vec()
}

#[test]
fn test_single_vmess_link_yields_one_match() {
    let matches = classify("check this vmess://ABC123 out", &all_types());

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].category, "vmess");
    assert_eq!(matches[0].config, "vmess://ABC123");
}

#[test]
fn test_disabled_categories_never_match() {
    let text = "vmess://ABC123 trojan://pass@host:443";
    let matches = classify(text, &["trojan"]);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].category, "trojan");
    assert!(classify(text, &Vec::<String>::new()).is_empty());
}

#[test]
fn test_vless_does_not_count_as_shadowsocks() {
    let text = "vless://uuid-1234@example.com:443?security=tls";
    let matches = classify(text, &all_types());

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].category, "vless");
}

#[test]
fn test_wireguard_block_stops_after_peer_keys() {
    let text = "Free config:\n[Interface]\nPrivateKey = abc\nAddress = 10.0.0.2/32\n\n[Peer]\nPublicKey = xyz\nEndpoint = 1.2.3.4:51820\n\nthanks!";
    let matches = classify(text, &["wireguard"]);

    assert_eq!(matches.len(), 1);
    let config = &matches[0].config;
    assert!(config.starts_with("[Interface]"));
    assert!(config.ends_with("Endpoint = 1.2.3.4:51820"));
    assert!(!config.contains("thanks"));
}

#[test]
fn test_output_follows_enabled_order() {
    let text = "trojan://p@h:1 vmess://QQ==";
    let categories: Vec<String> = classify(text, &["vmess", "trojan"])
        .into_iter()
        .map(|m| m.category)
        .collect();
    assert_eq!(categories, vec!["vmess", "trojan"]);

    let categories: Vec<String> = classify(text, &["trojan", "vmess"])
        .into_iter()
        .map(|m| m.category)
        .collect();
    assert_eq!(categories, vec!["trojan", "vmess"]);
}

#[test]
fn test_matches_are_substrings_of_input() {
    let corpus = [
        "new servers:\nvmess://eyJhZGQiOiIxLjIuMy40In0=\nvless://id@host:443#name",
        "ss://YWVzLTI1Ni1nY206cGFzcw==@5.6.7.8:8388 and ss://YWVz#outline-key",
        "outline://key shadowsocks://abc wg://peer",
        "https://t.me/proxy?server=1.1.1.1&port=443&secret=dd00",
        "nothing to see here",
    ];
    let mut enabled = all_types();
    enabled.push("proxy_links".to_string());

    for text in corpus {
        for found in classify(text, &enabled) {
            assert!(!found.config.is_empty());
            assert!(text.contains(&found.config), "{} not in {}", found.config, text);
        }
    }
}

#[test]
fn test_proxy_links_not_enabled_by_default() {
    let text = "https://t.me/proxy?server=1.1.1.1&port=443&secret=dd00";
    assert!(classify(text, &all_types()).is_empty());
    assert_eq!(classify(text, &["proxy_links"]).len(), 1);
}

#[test]
fn test_extension_matching() {
    let enabled = Settings::default().enabled_file_extensions().to_vec();

    assert_eq!(match_extension("FREE.OVPN", &enabled), Some(".ovpn".to_string()));
    assert_eq!(match_extension("notes.conf.txt", &enabled), Some(".txt".to_string()));
    assert_eq!(match_extension("tunnel.npvt", &enabled), Some(".npvt".to_string()));
    assert_eq!(match_extension("photo.jpg", &enabled), None);
    assert_eq!(match_extension("ovpn", &enabled), None);
}
