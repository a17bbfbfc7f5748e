use super::*;
use crate::composition::model::{Node, PromptInput, ReferenceInput};

fn prompted(text: &str) -> MediaNode {
    MediaNode {
        prompt: Some(PromptInput::Text(text.to_string())),
        ..MediaNode::default()
    }
}

#[test]
fn identical_inputs_give_identical_keys() {
    let b = ModelBindings::new();
    let mut a = prompted("a red fox");
    a.seed = Some(3);
    a.aspect_ratio = Some("9:16".into());
    let mut c = a.clone();
    c.id = Some("different-id".into());
    c.volume = Some(0.5);
    let ka = derive_key(&a, MediaNodeKind::Image, &b).unwrap();
    let kc = derive_key(&c, MediaNodeKind::Image, &b).unwrap();
    assert_eq!(ka, kc);
    assert_eq!(ka.digest(), kc.digest());
    assert_eq!(ka.digest().len(), 32);
}

#[test]
fn kind_prompt_and_params_change_the_key() {
    let b = ModelBindings::new();
    let base = derive_key(&prompted("x"), MediaNodeKind::Image, &b).unwrap().digest();
    assert_ne!(base, derive_key(&prompted("x"), MediaNodeKind::Video, &b).unwrap().digest());
    assert_ne!(base, derive_key(&prompted("y"), MediaNodeKind::Image, &b).unwrap().digest());
    let mut seeded = prompted("x");
    seeded.seed = Some(1);
    assert_ne!(base, derive_key(&seeded, MediaNodeKind::Image, &b).unwrap().digest());
    let mut named = prompted("x");
    named.model = Some("hq".into());
    // Unregistered handles are unbound, same as no binding at all.
    assert_eq!(base, derive_key(&named, MediaNodeKind::Image, &b).unwrap().digest());
}

#[test]
fn reference_order_matters() {
    let b = ModelBindings::new();
    let with_refs = |refs: Vec<ReferenceInput>| MediaNode {
        prompt: Some(PromptInput::Structured {
            text: "blend".into(),
            references: refs,
        }),
        ..MediaNode::default()
    };
    let lit = || ReferenceInput::Literal("refs/a.png".into());
    let nested = || ReferenceInput::Node(Box::new(Node::Image(prompted("a cat"))));

    let ab = derive_key(&with_refs(vec![lit(), nested()]), MediaNodeKind::Video, &b).unwrap();
    let ba = derive_key(&with_refs(vec![nested(), lit()]), MediaNodeKind::Video, &b).unwrap();
    let ab2 = derive_key(&with_refs(vec![lit(), nested()]), MediaNodeKind::Video, &b).unwrap();
    assert_ne!(ab.digest(), ba.digest());
    assert_eq!(ab.digest(), ab2.digest());
    assert!(matches!(ab.parts()[3], KeyPart::Ref(ref d) if d == &sha256_hex(b"refs/a.png")));
}

#[test]
fn literal_sources_key_on_locator() {
    let b = ModelBindings::new();
    let node = MediaNode {
        src: Some("media/a.mp4".into()),
        prompt: Some(PromptInput::Text("ignored".into())),
        ..MediaNode::default()
    };
    let k = derive_key(&node, MediaNodeKind::Video, &b).unwrap();
    assert!(k.is_source());
    assert_eq!(k.parts().len(), 3);
}

#[test]
fn no_prompt_and_no_src_is_a_resolution_error() {
    let err = derive_key(&MediaNode::default(), MediaNodeKind::Music, &ModelBindings::new())
        .unwrap_err();
    assert!(err.is_recoverable());
}
