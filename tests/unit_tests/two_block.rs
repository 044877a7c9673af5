use nalgebra::DVector;
use proptest::prelude::*;
use ssafem::two_block::{TwoBlockLayout, TwoBlockVector};
use ssafem::Error;

#[test]
fn index_sets_describe_concatenation() {
    let vector = TwoBlockVector::<f64>::zeros(3, 2);
    assert_eq!(vector.len(), 5);
    assert_eq!(vector.a_index_set(), 0..3);
    assert_eq!(vector.b_index_set(), 3..5);
    assert_eq!(vector.layout(), &TwoBlockLayout::new(3, 2));
}

#[test]
fn gather_places_blocks_in_composite() {
    let a = DVector::from_column_slice(&[1.0, 2.0]);
    let b = DVector::from_column_slice(&[3.0, 4.0, 5.0]);
    let mut vector = TwoBlockVector::zeros(2, 3);
    vector.gather(&a, &b).unwrap();
    assert_eq!(vector.as_vector(), &DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]));
    assert_eq!(TwoBlockVector::from_blocks(&a, &b), vector);
}

#[test]
fn scatter_extracts_blocks_from_composite() {
    let data = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let vector = TwoBlockVector::from_vector(data, 2).unwrap();

    let mut a = DVector::zeros(2);
    let mut b = DVector::zeros(3);
    vector.scatter(&mut a, &mut b).unwrap();
    assert_eq!(a, DVector::from_column_slice(&[1.0, 2.0]));
    assert_eq!(b, DVector::from_column_slice(&[3.0, 4.0, 5.0]));
    assert_eq!(vector.scatter_new(), (a, b));
}

#[test]
fn single_block_operations_leave_other_block_untouched() {
    let mut vector = TwoBlockVector::from_vector(DVector::from_column_slice(&[1.0, 2.0, 3.0]), 1).unwrap();
    vector.gather_from_b(&DVector::from_column_slice(&[7.0, 8.0])).unwrap();
    assert_eq!(vector.as_vector(), &DVector::from_column_slice(&[1.0, 7.0, 8.0]));

    vector.gather_from_a(&DVector::from_column_slice(&[9.0])).unwrap();
    assert_eq!(vector.as_vector(), &DVector::from_column_slice(&[9.0, 7.0, 8.0]));

    let mut a = DVector::zeros(1);
    let mut b = DVector::zeros(2);
    vector.scatter_to_a(&mut a).unwrap();
    vector.scatter_to_b(&mut b).unwrap();
    assert_eq!(a, DVector::from_column_slice(&[9.0]));
    assert_eq!(b, DVector::from_column_slice(&[7.0, 8.0]));
}

#[test]
fn layout_operates_on_external_composite() {
    let layout = TwoBlockLayout::new(2, 1);
    let a = DVector::from_column_slice(&[1.0, 2.0]);
    let b = DVector::from_column_slice(&[3.0]);

    let ab = layout.gather_new(&a, &b).unwrap();
    assert_eq!(ab, DVector::from_column_slice(&[1.0, 2.0, 3.0]));
    assert_eq!(layout.scatter_new(&ab).unwrap(), (a.clone(), b.clone()));

    let mut ab = DVector::zeros(3);
    layout.gather_from_b(&b, &mut ab).unwrap();
    assert_eq!(ab, DVector::from_column_slice(&[0.0, 0.0, 3.0]));
    layout.gather_from_a(&a, &mut ab).unwrap();

    let mut a_out = DVector::zeros(2);
    let mut b_out = DVector::zeros(1);
    layout.scatter_to_a(&ab, &mut a_out).unwrap();
    layout.scatter_to_b(&ab, &mut b_out).unwrap();
    assert_eq!((a_out, b_out), (a, b));
}

#[test]
fn size_mismatch_is_reported() {
    let mut vector = TwoBlockVector::<f64>::zeros(2, 3);
    let result = vector.gather(&DVector::zeros(3), &DVector::zeros(3));
    assert!(matches!(result, Err(Error::SizeMismatch { expected: 2, actual: 3 })));

    let mut a = DVector::zeros(2);
    let mut b = DVector::zeros(1);
    let result = vector.scatter(&mut a, &mut b);
    assert!(matches!(result, Err(Error::SizeMismatch { expected: 3, actual: 1 })));

    let layout = TwoBlockLayout::new(2, 3);
    let mut short = DVector::<f64>::zeros(4);
    let result = layout.gather_from_a(&DVector::zeros(2), &mut short);
    assert!(matches!(result, Err(Error::SizeMismatch { expected: 5, actual: 4 })));
    let result = layout.scatter_to_b(&short, &mut DVector::zeros(3));
    assert!(matches!(result, Err(Error::SizeMismatch { expected: 5, actual: 4 })));

    assert!(TwoBlockVector::from_vector(DVector::<f64>::zeros(2), 3).is_err());
}

proptest! {
    #[test]
    fn gather_then_scatter_reproduces_blocks(
        a in proptest::collection::vec(-1e6..1e6f64, 0..10),
        b in proptest::collection::vec(-1e6..1e6f64, 0..10),
    ) {
        let a = DVector::from_vec(a);
        let b = DVector::from_vec(b);
        let mut vector = TwoBlockVector::zeros(a.len(), b.len());
        vector.gather(&a, &b).unwrap();

        let mut a_out = DVector::zeros(a.len());
        let mut b_out = DVector::zeros(b.len());
        vector.scatter(&mut a_out, &mut b_out).unwrap();
        prop_assert_eq!(&a_out, &a);
        prop_assert_eq!(&b_out, &b);

        let (a_new, b_new) = vector.scatter_new();
        prop_assert_eq!(a_new, a);
        prop_assert_eq!(b_new, b);
    }
}
