use pathmirror::bridge::Session;
use pathmirror::taxonomy::{ClassPath, Rgb};
use pathmirror::Taxonomy;
use proptest::prelude::*;

mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn get_or_create_is_idempotent(names in proptest_helpers::arb_class_path(3)) {
        let session = Session::in_memory().expect("start session");
        let taxonomy = Taxonomy::new(&session);

        let first = taxonomy.get_or_create(&names).expect("first create");
        let len = taxonomy.len();
        let second = taxonomy.get_or_create(&names).expect("second create");

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(taxonomy.len(), len);
        prop_assert_eq!(first.path().names(), names.as_slice());
    }

    #[test]
    fn color_is_shared_between_lookups(
        names in proptest_helpers::arb_class_path(3),
        (r, g, b) in any::<(u8, u8, u8)>(),
        set_on_first in any::<bool>(),
    ) {
        let session = Session::in_memory().expect("start session");
        let taxonomy = Taxonomy::new(&session);
        let first = taxonomy.get_or_create(&names).expect("first create");
        let second = taxonomy.get_or_create(&names).expect("second create");

        let color = Rgb::new(r, g, b);
        let target = if set_on_first { &first } else { &second };
        taxonomy.set_color(target, color).expect("set color");

        prop_assert_eq!(first.color().expect("first color"), color);
        prop_assert_eq!(second.color().expect("second color"), color);
    }

    #[test]
    fn display_and_parse_agree(names in proptest_helpers::arb_class_path(4)) {
        let session = Session::in_memory().expect("start session");
        let taxonomy = Taxonomy::new(&session);
        let created = taxonomy.get_or_create(&names).expect("create");

        let parsed = taxonomy.parse(&created.to_string()).expect("parse");
        prop_assert_eq!(&parsed, &created);
        prop_assert_eq!(ClassPath::parse(&created.path().to_string()).expect("path"), created.path().clone());
        // one class per ancestor
        prop_assert_eq!(taxonomy.len(), names.len());
    }
}
