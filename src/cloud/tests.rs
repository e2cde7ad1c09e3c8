//! Unit tests for provider payload decoding and identifier handling.

use std::net::Ipv4Addr;

use rstest::rstest;

use super::digitalocean::{error_message, parse_created, parse_droplet};
use super::*;

const DROPLET_JSON: &str = r#"{
  "droplet": {
    "id": 3164444,
    "name": "web-1",
    "memory": 1024,
    "vcpus": 1,
    "locked": false,
    "status": "active",
    "created_at": "2024-05-07T14:11:12Z",
    "size_slug": "s-1vcpu-1gb",
    "image": { "id": 6918990, "slug": "ubuntu-24-04-x64" },
    "region": { "slug": "ams3", "name": "Amsterdam 3" },
    "networks": {
      "v4": [
        { "ip_address": "10.128.192.124", "type": "private" },
        { "ip_address": "104.236.32.182", "type": "public" }
      ],
      "v6": []
    }
  }
}"#;

#[rstest]
fn parse_droplet_maps_networks_and_slugs() {
    let droplet = parse_droplet("/droplets/3164444", DROPLET_JSON.as_bytes())
        .expect("payload should decode");

    assert_eq!(droplet.id, DropletId::new(3_164_444));
    assert_eq!(droplet.name, "web-1");
    assert_eq!(droplet.size, "s-1vcpu-1gb");
    assert_eq!(droplet.image, "ubuntu-24-04-x64");
    assert_eq!(droplet.region, "ams3");
    assert_eq!(droplet.public_ipv4, Some(Ipv4Addr::new(104, 236, 32, 182)));
    assert_eq!(droplet.private_ipv4, Some(Ipv4Addr::new(10, 128, 192, 124)));
    assert!(!droplet.locked);
    assert_eq!(droplet.status, "active");
}

#[rstest]
fn parse_droplet_falls_back_to_image_id_for_private_images() {
    let body = r#"{"droplet":{"id":7,"name":"snap","image":{"id":42,"slug":null}}}"#;
    let droplet = parse_droplet("/droplets/7", body.as_bytes()).expect("payload should decode");

    assert_eq!(droplet.image, "42");
    assert_eq!(droplet.public_ip(), None);
}

#[rstest]
fn parse_created_extracts_create_action() {
    let body = r#"{
      "droplet": { "id": 9, "name": "fresh", "status": "new", "networks": { "v4": [] } },
      "links": { "actions": [ { "id": 36805096, "rel": "create", "href": "https://example/actions/36805096" } ] }
    }"#;
    let created = parse_created("/droplets", body.as_bytes()).expect("payload should decode");

    assert_eq!(created.droplet.id, DropletId::new(9));
    assert_eq!(created.action, Some(ActionId::new(36_805_096)));
    assert_eq!(created.droplet.status, "new");
}

#[rstest]
fn parse_created_without_action_link_keeps_the_droplet() {
    let body = r#"{ "droplet": { "id": 9, "name": "fresh" } }"#;
    let created = parse_created("/droplets", body.as_bytes()).expect("payload should decode");

    assert_eq!(created.droplet.id, DropletId::new(9));
    assert_eq!(created.action, None);
}

#[rstest]
fn error_message_prefers_provider_message() {
    let body = br#"{"id":"unprocessable_entity","message":"Region is not available"}"#;
    assert_eq!(error_message(body), "Region is not available");
    assert_eq!(error_message(b"  gateway timeout \n"), "gateway timeout");
}

#[rstest]
#[case("completed", ActionStatus::Completed)]
#[case("done", ActionStatus::Completed)]
#[case("errored", ActionStatus::Errored)]
#[case("in-progress", ActionStatus::InProgress)]
#[case("mystery", ActionStatus::InProgress)]
fn action_status_from_wire(#[case] raw: &str, #[case] expected: ActionStatus) {
    assert_eq!(ActionStatus::from_wire(raw), expected);
}

#[rstest]
fn droplet_id_parses_trimmed_input() {
    assert_eq!(" 1234 \n".parse::<DropletId>(), Ok(DropletId::new(1234)));
    assert!("web-1".parse::<DropletId>().is_err());
}
