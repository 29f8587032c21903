//! Sequence, set and map marshaling.
//!
//! Lists are read with `size()`/`get(int)` and written by appending to an
//! `ArrayList`, so order survives in both directions. Sets and maps are read
//! through the iterator protocol; the concrete class written back depends on
//! whether the native container is sorted (`TreeSet`, `TreeMap`) or hashed
//! (`HashSet`, `HashMap`). Every element handle is scoped to one iteration.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::{BuildHasher, Hash};

use crate::arg_type::{ArgType, non_null};
use crate::error::{Error, Result};
use crate::refs::{LocalClassRef, LocalRef};
use crate::signature::{TypeTag, kotlin_specialization};
use crate::sys::{JObject, JValue, JniEnv};

/// Reads a `java.util.List` into a `Vec`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn native_list<T: ArgType>(env: &JniEnv, value: JValue) -> Result<Vec<T>> {
    let list = non_null(value, || "java.util.List".to_owned())?;
    let class = LocalClassRef::find(env, "java/util/List")?;
    let size = class.method("size", "()I")?;
    let get = class.method("get", "(I)Ljava/lang/Object;")?;

    let len = size.call(env, list, &[])?.i()?;
    let mut items = Vec::with_capacity(len.max(0) as usize);
    for index in 0..len {
        let item = LocalRef::new(env, get.call(env, list, &[JValue::Int(index)])?.l()?);
        items.push(T::java_unbox(env, item.as_obj())?);
    }
    Ok(items)
}

/// Writes items into a new `java.util.ArrayList`, preserving order.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn java_list<T, I>(env: &JniEnv, items: I) -> Result<JValue>
where
    T: ArgType,
    I: IntoIterator<Item = T>,
    I::IntoIter: ExactSizeIterator,
{
    let items = items.into_iter();
    let capacity = i32::try_from(items.len()).unwrap_or(i32::MAX);

    let class = LocalClassRef::find(env, "java/util/ArrayList")?;
    let list = class.new_object("(I)V", &[JValue::Int(capacity)])?;
    let add = class.method("add", "(Ljava/lang/Object;)Z")?;

    for item in items {
        let boxed = LocalRef::new(env, T::java_box(env, item)?);
        add.call(env, list.as_obj(), &[JValue::Object(boxed.as_obj())])?;
    }
    Ok(JValue::Object(list.into_raw()))
}

/// Visits every element of a `java.lang.Iterable` through its iterator.
pub fn for_each_element<F>(env: &JniEnv, iterable: JObject, mut visit: F) -> Result<()>
where
    F: FnMut(JObject) -> Result<()>,
{
    let class = LocalClassRef::of_object(env, iterable)?;
    let iterator = class.method("iterator", "()Ljava/util/Iterator;")?;
    let iter = LocalRef::new(env, iterator.call(env, iterable, &[])?.l()?);
    if iter.is_null() {
        return Err(Error::NullReference("java.util.Iterator".into()));
    }

    let iter_class = LocalClassRef::find(env, "java/util/Iterator")?;
    let has_next = iter_class.method("hasNext", "()Z")?;
    let next = iter_class.method("next", "()Ljava/lang/Object;")?;

    while has_next.call(env, iter.as_obj(), &[])?.z()? {
        let element = LocalRef::new(env, next.call(env, iter.as_obj(), &[])?.l()?);
        visit(element.as_obj())?;
    }
    Ok(())
}

/// Reads a `java.util.Set` into any extendable native collection.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn native_set<T, C>(env: &JniEnv, value: JValue) -> Result<C>
where
    T: ArgType,
    C: Default + Extend<T>,
{
    let set = non_null(value, || "java.util.Set".to_owned())?;
    let mut out = C::default();
    for_each_element(env, set, |element| {
        out.extend(Some(T::java_unbox(env, element)?));
        Ok(())
    })?;
    Ok(out)
}

/// Writes items into a new instance of `concrete_class` through `add`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn java_set<T, I>(env: &JniEnv, concrete_class: &str, items: I) -> Result<JValue>
where
    T: ArgType,
    I: IntoIterator<Item = T>,
{
    let class = LocalClassRef::find(env, concrete_class)?;
    let set = class.new_object("()V", &[])?;
    let add = class.method("add", "(Ljava/lang/Object;)Z")?;

    for item in items {
        let boxed = LocalRef::new(env, T::java_box(env, item)?);
        add.call(env, set.as_obj(), &[JValue::Object(boxed.as_obj())])?;
    }
    Ok(JValue::Object(set.into_raw()))
}

/// Reads a `java.util.Map` through its entry set.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn native_map<K, V, C>(env: &JniEnv, value: JValue) -> Result<C>
where
    K: ArgType,
    V: ArgType,
    C: Default + Extend<(K, V)>,
{
    let map = non_null(value, || "java.util.Map".to_owned())?;
    let class = LocalClassRef::find(env, "java/util/Map")?;
    let entry_set = class.method("entrySet", "()Ljava/util/Set;")?;
    let entries = LocalRef::new(env, entry_set.call(env, map, &[])?.l()?);
    if entries.is_null() {
        return Err(Error::NullReference("java.util.Set".into()));
    }

    let entry_class = LocalClassRef::find(env, "java/util/Map$Entry")?;
    let get_key = entry_class.method("getKey", "()Ljava/lang/Object;")?;
    let get_value = entry_class.method("getValue", "()Ljava/lang/Object;")?;

    let mut out = C::default();
    for_each_element(env, entries.as_obj(), |entry| {
        let key = LocalRef::new(env, get_key.call(env, entry, &[])?.l()?);
        let value = LocalRef::new(env, get_value.call(env, entry, &[])?.l()?);
        let key = K::java_unbox(env, key.as_obj())?;
        let value = V::java_unbox(env, value.as_obj())?;
        out.extend(Some((key, value)));
        Ok(())
    })?;
    Ok(out)
}

/// Writes pairs into a new instance of `concrete_class` through `put`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn java_map<K, V, I>(env: &JniEnv, concrete_class: &str, items: I) -> Result<JValue>
where
    K: ArgType,
    V: ArgType,
    I: IntoIterator<Item = (K, V)>,
{
    let class = LocalClassRef::find(env, concrete_class)?;
    let map = class.new_object("()V", &[])?;
    let put = class.method("put", "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;")?;

    for (key, value) in items {
        let key = LocalRef::new(env, K::java_box(env, key)?);
        let value = LocalRef::new(env, V::java_box(env, value)?);
        let previous = put.call(
            env,
            map.as_obj(),
            &[JValue::Object(key.as_obj()), JValue::Object(value.as_obj())],
        )?;
        drop(LocalRef::new(env, previous.l()?));
    }
    Ok(JValue::Object(map.into_raw()))
}

fn list_kotlin<T: ArgType>() -> Cow<'static, str> {
    Cow::Owned(kotlin_specialization("java.util.List", &[&*T::kotlin_type()]))
}

fn set_kotlin<T: ArgType>() -> Cow<'static, str> {
    Cow::Owned(kotlin_specialization("java.util.Set", &[&*T::kotlin_type()]))
}

fn map_kotlin<K: ArgType, V: ArgType>() -> Cow<'static, str> {
    Cow::Owned(kotlin_specialization(
        "java.util.Map",
        &[&*K::kotlin_type(), &*V::kotlin_type()],
    ))
}

impl<T: ArgType> ArgType for Vec<T> {
    const TAG: TypeTag = T::VEC_TAG;

    fn type_sig() -> Cow<'static, str> {
        T::vec_type_sig()
    }

    fn kotlin_type() -> Cow<'static, str> {
        T::vec_kotlin_type()
    }

    fn native_value(env: &JniEnv, value: JValue) -> Result<Self> {
        T::native_vec(env, value)
    }

    fn java_value(env: &JniEnv, value: Self) -> Result<JValue> {
        T::java_vec(env, value)
    }
}

impl<T: ArgType> ArgType for VecDeque<T> {
    const TAG: TypeTag = TypeTag::Object;

    fn type_sig() -> Cow<'static, str> {
        Cow::Borrowed("Ljava/util/List;")
    }

    fn kotlin_type() -> Cow<'static, str> {
        list_kotlin::<T>()
    }

    fn native_value(env: &JniEnv, value: JValue) -> Result<Self> {
        native_list(env, value).map(VecDeque::from)
    }

    fn java_value(env: &JniEnv, value: Self) -> Result<JValue> {
        java_list(env, value)
    }
}

impl<T: ArgType> ArgType for LinkedList<T> {
    const TAG: TypeTag = TypeTag::Object;

    fn type_sig() -> Cow<'static, str> {
        Cow::Borrowed("Ljava/util/List;")
    }

    fn kotlin_type() -> Cow<'static, str> {
        list_kotlin::<T>()
    }

    fn native_value(env: &JniEnv, value: JValue) -> Result<Self> {
        Ok(native_list(env, value)?.into_iter().collect())
    }

    fn java_value(env: &JniEnv, value: Self) -> Result<JValue> {
        let items: Vec<T> = value.into_iter().collect();
        java_list(env, items)
    }
}

impl<T, S> ArgType for HashSet<T, S>
where
    T: ArgType + Eq + Hash,
    S: BuildHasher + Default,
{
    const TAG: TypeTag = TypeTag::Object;

    fn type_sig() -> Cow<'static, str> {
        Cow::Borrowed("Ljava/util/Set;")
    }

    fn kotlin_type() -> Cow<'static, str> {
        set_kotlin::<T>()
    }

    fn native_value(env: &JniEnv, value: JValue) -> Result<Self> {
        native_set::<T, Self>(env, value)
    }

    fn java_value(env: &JniEnv, value: Self) -> Result<JValue> {
        java_set(env, "java/util/HashSet", value)
    }
}

impl<T: ArgType + Ord> ArgType for BTreeSet<T> {
    const TAG: TypeTag = TypeTag::Object;

    fn type_sig() -> Cow<'static, str> {
        Cow::Borrowed("Ljava/util/Set;")
    }

    fn kotlin_type() -> Cow<'static, str> {
        set_kotlin::<T>()
    }

    fn native_value(env: &JniEnv, value: JValue) -> Result<Self> {
        native_set::<T, Self>(env, value)
    }

    fn java_value(env: &JniEnv, value: Self) -> Result<JValue> {
        java_set(env, "java/util/TreeSet", value)
    }
}

impl<K, V, S> ArgType for HashMap<K, V, S>
where
    K: ArgType + Eq + Hash,
    V: ArgType,
    S: BuildHasher + Default,
{
    const TAG: TypeTag = TypeTag::Object;

    fn type_sig() -> Cow<'static, str> {
        Cow::Borrowed("Ljava/util/Map;")
    }

    fn kotlin_type() -> Cow<'static, str> {
        map_kotlin::<K, V>()
    }

    fn native_value(env: &JniEnv, value: JValue) -> Result<Self> {
        native_map::<K, V, Self>(env, value)
    }

    fn java_value(env: &JniEnv, value: Self) -> Result<JValue> {
        java_map(env, "java/util/HashMap", value)
    }
}

impl<K: ArgType + Ord, V: ArgType> ArgType for BTreeMap<K, V> {
    const TAG: TypeTag = TypeTag::Object;

    fn type_sig() -> Cow<'static, str> {
        Cow::Borrowed("Ljava/util/Map;")
    }

    fn kotlin_type() -> Cow<'static, str> {
        map_kotlin::<K, V>()
    }

    fn native_value(env: &JniEnv, value: JValue) -> Result<Self> {
        native_map::<K, V, Self>(env, value)
    }

    fn java_value(env: &JniEnv, value: Self) -> Result<JValue> {
        java_map(env, "java/util/TreeMap", value)
    }
}
