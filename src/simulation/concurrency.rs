//! Thin wrappers around rayon for per-particle loops over attribute vectors.
//!
//! Every closure receives the particle index together with mutable access to
//! that particle's entries, so loops over several attribute vectors read the
//! same way as their sequential counterparts.

use rayon::prelude::*;

pub fn into_par_iter<T>(v: impl IntoParallelIterator<Item = T>) -> impl ParallelIterator<Item = T> {
    v.into_par_iter()
}

pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
    arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
        f(idx, v1);
    });
}

pub fn par_iter_mut3<
    T1: Send + Sync,
    T2: Send + Sync,
    T3: Send + Sync,
    F: Fn(usize, &mut T1, &mut T2, &mut T3) + Send + Sync,
>(
    arr1: &mut [T1],
    arr2: &mut [T2],
    arr3: &mut [T3],
    f: F,
) {
    assert!(arr1.len() == arr2.len() && arr2.len() == arr3.len());
    arr1.into_par_iter()
        .zip(arr2.into_par_iter())
        .zip(arr3.into_par_iter())
        .enumerate()
        .for_each(|(idx, ((v1, v2), v3))| {
            f(idx, v1, v2, v3);
        });
}

pub fn par_iter_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
    arr1: &mut [T1],
    arr2: &mut [T2],
    f: F,
) {
    assert_eq!(arr1.len(), arr2.len());
    arr1.into_par_iter()
        .zip(arr2.into_par_iter())
        .enumerate()
        .for_each(|(idx, (v1, v2))| {
            f(idx, v1, v2);
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_match_elements() {
        let mut a: Vec<usize> = vec![0; 1000];
        let mut b: Vec<usize> = vec![0; 1000];
        let mut c: Vec<usize> = vec![0; 1000];

        par_iter_mut1(&mut a, |i, x| *x = i);
        par_iter_mut3(&mut a, &mut b, &mut c, |i, x, y, z| {
            *y = *x * 2;
            *z = i + 1;
        });

        par_iter_mut2(&mut b, &mut c, |i, y, z| {
            assert_eq!(*y, 2 * i);
            assert_eq!(*z, i + 1);
            *y += 1;
        });
        assert_eq!(b[10], 21);

        let collected: Vec<usize> = into_par_iter(0..10usize).map(|i| i * i).collect();
        assert_eq!(collected[3], 9);
    }
}
