//! Union field -> property derivation.
//!
//! A field typed as a discriminated union becomes a `PROPERTY_DECL`. The
//! candidates' conditions are translated twice (getter and setter access
//! direction), the distinct field types are clustered by common-type
//! compatibility, and each cluster yields one merged property. Iteration
//! follows insertion order throughout so output is deterministic.

use std::collections::HashSet;

use ebmc_ast::{Node, NodeId};
use ebmc_core::{
    ExprOp, ExpressionRef, MergeMode, PropertyDecl, PropertyMemberDecl, StatementBody,
    StatementRef, TypeBody, TypeKind, TypeRef, VariantDesc,
};
use indexmap::IndexMap;

use crate::build::Build;
use crate::context::{Converter, GenerateMode};
use crate::error::{ConvertError, Result};

/// One union candidate, with its condition translated per access direction.
struct CandidateInfo {
    getter_cond: ExpressionRef,
    setter_cond: ExpressionRef,
    field: Option<StatementRef>,
}

#[derive(Clone, Copy, Default)]
struct BaseConds {
    getter: ExpressionRef,
    setter: ExpressionRef,
}

/// A position in a per-type member list: either a real member or a
/// condition-only filler for candidates that store no field of this type.
enum MemberSlot {
    NoField { getter: ExpressionRef, setter: ExpressionRef },
    Member(PropertyMemberDecl),
}

struct DetectedTypes {
    /// Distinct field types in first-seen order.
    order: Vec<TypeRef>,
    /// Per-type member lists, keyed by type id, same insertion order.
    merged: IndexMap<u64, Vec<MemberSlot>>,
}

impl Converter<'_> {
    /// Entry point from field conversion: `id` is the reserved statement ref
    /// of the property itself.
    pub(crate) fn convert_property_decl(
        &mut self,
        id: StatementRef,
        field_node: NodeId,
        union_node: NodeId,
    ) -> Result<StatementBody> {
        let Node::Field { ident, belong, .. } = self.node(field_node).clone() else {
            return Err(ConvertError::internal("property derivation on non-field".to_string()));
        };
        let name = match ident {
            Some(name) => self.module.add_identifier(name)?,
            None => self.module.add_anonymous_identifier()?,
        };
        let parent_format = match belong {
            Some(parent) => self.convert_decl(parent)?,
            None => StatementRef::NIL,
        };
        let mut decl = PropertyDecl { name, parent_format, ..PropertyDecl::default() };
        self.derive_property_type(id, &mut decl, union_node)?;
        Ok(StatementBody::PropertyDecl(decl))
    }

    fn derive_property_type(
        &mut self,
        id: StatementRef,
        decl: &mut PropertyDecl,
        union_node: NodeId,
    ) -> Result<()> {
        let Node::UnionType { cond, candidates, .. } = self.node(union_node).clone() else {
            return Err(ConvertError::internal("not a union type".to_string()));
        };

        let base_cond = self.convert_both_directions(cond)?;
        let mut cases = Vec::with_capacity(candidates.len());
        for cand in candidates {
            let Node::UnionCandidate { cond, field } = self.node(cand).clone() else {
                return Err(ConvertError::unsupported("union candidate of unexpected kind"));
            };
            let conds = self.convert_both_directions(cond)?;
            let field = match field {
                Some(f) => Some(self.convert_decl(f)?),
                None => None,
            };
            cases.push(CandidateInfo {
                getter_cond: conds.getter,
                setter_cond: conds.setter,
                field,
            });
        }

        let mut detected = self.detect_all_types(&cases)?;
        self.merge_fields_per_type(&cases, &mut detected)?;
        tracing::debug!(types = detected.order.len(), "merged union property types");

        if detected.order.len() == 1 {
            let ty = detected.order[0];
            let slots = detected.merged.shift_remove(&ty.0).expect("detected type present");
            return self.strict_merge(decl, base_cond, ty, slots);
        }

        let mut strict_props = Vec::with_capacity(detected.order.len());
        for ty in detected.order.clone() {
            let mut prop = PropertyDecl {
                name: decl.name,
                parent_format: decl.parent_format,
                ..PropertyDecl::default()
            };
            let slots = self.clone_slots_for(&detected, ty)?;
            self.strict_merge(&mut prop, base_cond, ty, slots)?;
            strict_props.push(prop);
        }

        let clusters = self.cluster_properties(&strict_props)?;
        let mut final_props =
            self.common_merge(id, base_cond, decl, clusters, strict_props, &detected)?;
        if final_props.len() == 1 {
            *decl = final_props.pop().expect("one property");
        } else {
            self.uncommon_merge(id, base_cond, decl, final_props, &detected)?;
        }
        Ok(())
    }

    /// Converts a condition once per property access direction. The two
    /// directions produce distinct expression trees bound at synthesis time.
    fn convert_both_directions(&mut self, cond: Option<NodeId>) -> Result<BaseConds> {
        let Some(cond) = cond else {
            return Ok(BaseConds::default());
        };
        let getter =
            self.with_mode(GenerateMode::PropertyGetter, |c| c.convert_expr(cond))?;
        let setter =
            self.with_mode(GenerateMode::PropertySetter, |c| c.convert_expr(cond))?;
        Ok(BaseConds { getter, setter })
    }

    /// The `(field statement, stored type)` pairs behind a union candidate
    /// field; nested merged properties contribute their strict parts.
    fn map_field(&self, field: StatementRef) -> Result<Vec<(StatementRef, TypeRef)>> {
        let entry = self
            .module
            .get_statement(field)
            .ok_or_else(|| ConvertError::internal(format!("unresolved union field {field}")))?;
        match &entry.body {
            StatementBody::FieldDecl(f) => Ok(vec![(field, f.field_type)]),
            StatementBody::PropertyDecl(p) => {
                if p.merge_mode == MergeMode::StrictType {
                    Ok(vec![(field, p.property_type)])
                } else {
                    let derived = p.derived_from.clone();
                    let mut out = Vec::new();
                    for d in derived {
                        out.extend(self.map_field(d)?);
                    }
                    Ok(out)
                }
            }
            other => Err(ConvertError::unsupported(format!(
                "{:?} inside a union type",
                other.kind()
            ))),
        }
    }

    fn detect_all_types(&mut self, cases: &[CandidateInfo]) -> Result<DetectedTypes> {
        let mut detected = DetectedTypes { order: Vec::new(), merged: IndexMap::new() };
        for case in cases {
            let Some(field) = case.field else { continue };
            for (_, ty) in self.map_field(field)? {
                if !detected.merged.contains_key(&ty.0) {
                    detected.merged.insert(ty.0, Vec::new());
                    detected.order.push(ty);
                }
            }
        }
        if detected.order.is_empty() {
            return Err(ConvertError::internal(
                "no field type detected in union property".to_string(),
            ));
        }
        Ok(detected)
    }

    /// Fills every per-type member list position by position; positions a
    /// candidate does not cover get condition-only fillers.
    fn merge_fields_per_type(
        &mut self,
        cases: &[CandidateInfo],
        detected: &mut DetectedTypes,
    ) -> Result<()> {
        for case in cases {
            let mut added: HashSet<u64> = HashSet::new();
            if let Some(field) = case.field {
                for (member_field, ty) in self.map_field(field)? {
                    added.insert(ty.0);
                    detected
                        .merged
                        .get_mut(&ty.0)
                        .ok_or_else(|| {
                            ConvertError::internal("undetected union type".to_string())
                        })?
                        .push(MemberSlot::Member(PropertyMemberDecl {
                            getter_condition: case.getter_cond,
                            setter_condition: case.setter_cond,
                            field: member_field,
                        }));
                }
            }
            for (ty, slots) in detected.merged.iter_mut() {
                if !added.contains(ty) {
                    slots.push(MemberSlot::NoField {
                        getter: case.getter_cond,
                        setter: case.setter_cond,
                    });
                }
            }
        }
        let mut lens = detected.merged.values().map(Vec::len);
        let first = lens.next().unwrap_or(0);
        if lens.any(|l| l != first) {
            return Err(ConvertError::internal(
                "inconsistent member list lengths across union types".to_string(),
            ));
        }
        Ok(())
    }

    fn clone_slots_for(&self, detected: &DetectedTypes, ty: TypeRef) -> Result<Vec<MemberSlot>> {
        let slots = detected
            .merged
            .get(&ty.0)
            .ok_or_else(|| ConvertError::internal("undetected union type".to_string()))?;
        Ok(slots
            .iter()
            .map(|s| match s {
                MemberSlot::NoField { getter, setter } => {
                    MemberSlot::NoField { getter: *getter, setter: *setter }
                }
                MemberSlot::Member(m) => MemberSlot::Member(m.clone()),
            })
            .collect())
    }

    /// One property over a single field type; adjacent no-field positions
    /// coalesce into a single OR-condition member.
    fn strict_merge(
        &mut self,
        decl: &mut PropertyDecl,
        base_cond: BaseConds,
        ty: TypeRef,
        slots: Vec<MemberSlot>,
    ) -> Result<()> {
        decl.merge_mode = MergeMode::StrictType;
        decl.property_type = ty;
        decl.getter_condition = base_cond.getter;
        decl.setter_condition = base_cond.setter;
        let mut pending_getter: Vec<ExpressionRef> = Vec::new();
        let mut pending_setter: Vec<ExpressionRef> = Vec::new();
        for slot in slots {
            match slot {
                MemberSlot::NoField { getter, setter } => {
                    pending_getter.push(getter);
                    pending_setter.push(setter);
                }
                MemberSlot::Member(member) => {
                    if !pending_getter.is_empty() {
                        let filler = self.coalesced_member(
                            std::mem::take(&mut pending_getter),
                            std::mem::take(&mut pending_setter),
                        )?;
                        decl.members.push(filler);
                    }
                    let member =
                        self.add_stmt(StatementBody::PropertyMemberDecl(member))?;
                    decl.members.push(member);
                }
            }
        }
        Ok(())
    }

    /// A condition-only member covering a run of no-field candidates, OR-ing
    /// their conditions.
    fn coalesced_member(
        &mut self,
        getters: Vec<ExpressionRef>,
        setters: Vec<ExpressionRef>,
    ) -> Result<StatementRef> {
        let getter_condition = self.derive_cond(getters)?;
        let setter_condition = self.derive_cond(setters)?;
        self.add_stmt(StatementBody::PropertyMemberDecl(PropertyMemberDecl {
            getter_condition,
            setter_condition,
            field: StatementRef::NIL,
        }))
    }

    /// OR of several conditions, typed with their common type.
    fn derive_cond(&mut self, conds: Vec<ExpressionRef>) -> Result<ExpressionRef> {
        if conds.is_empty() {
            return Err(ConvertError::internal(
                "empty condition run in property merge".to_string(),
            ));
        }
        if conds.len() == 1 {
            return Ok(conds[0]);
        }
        let mut common: Option<TypeRef> = None;
        for cond in &conds {
            let ty = self
                .module
                .get_expression(*cond)
                .map(|e| e.body.ty)
                .ok_or_else(|| ConvertError::internal("unresolved condition".to_string()))?;
            common = Some(match common {
                None => ty,
                Some(prev) => self.common_type_of(prev, ty)?.ok_or_else(|| {
                    ConvertError::internal("no common type for condition run".to_string())
                })?,
            });
        }
        let common = common.expect("non-empty run");
        self.add_expr(common, ExprOp::OrCond { conditions: conds })
    }

    /// Common super-type of two types, per the clustering rules: same-kind
    /// numerics widen, `USIZE` absorbs integers, integrals absorb variants,
    /// an open range is compatible with anything.
    pub(crate) fn common_type_of(&mut self, a: TypeRef, b: TypeRef) -> Result<Option<TypeRef>> {
        if a == b {
            return Ok(Some(a));
        }
        let body_a = self
            .module
            .get_type(a)
            .ok_or_else(|| ConvertError::internal(format!("unresolved type {a}")))?
            .body
            .clone();
        let body_b = self
            .module
            .get_type(b)
            .ok_or_else(|| ConvertError::internal(format!("unresolved type {b}")))?
            .body
            .clone();
        let (ka, kb) = (body_a.kind(), body_b.kind());
        if ka != kb {
            let integral_a = body_a.is_integral();
            let integral_b = body_b.is_integral();
            if ka == TypeKind::Usize && matches!(kb, TypeKind::Int | TypeKind::Uint) {
                return Ok(Some(a));
            }
            if kb == TypeKind::Usize && matches!(ka, TypeKind::Int | TypeKind::Uint) {
                return Ok(Some(b));
            }
            if integral_a && kb == TypeKind::Variant {
                return Ok(Some(a));
            }
            if integral_b && ka == TypeKind::Variant {
                return Ok(Some(b));
            }
            let open_range =
                |body: &TypeBody| matches!(body, TypeBody::Range { base_type } if base_type.is_nil());
            if open_range(&body_a) {
                return Ok(Some(b));
            }
            if open_range(&body_b) {
                return Ok(Some(a));
            }
            return Ok(None);
        }
        match ka {
            TypeKind::Int | TypeKind::Uint | TypeKind::Float => {
                let sa = body_a.bit_size().unwrap_or(0);
                let sb = body_b.bit_size().unwrap_or(0);
                Ok(Some(if sa > sb { a } else { b }))
            }
            _ => Ok(None),
        }
    }

    /// Connected components under pairwise common-type compatibility,
    /// preserving insertion order within each cluster.
    fn cluster_properties(&mut self, props: &[PropertyDecl]) -> Result<Vec<Vec<usize>>> {
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); props.len()];
        for i in 0..props.len() {
            for j in (i + 1)..props.len() {
                if self
                    .common_type_of(props[i].property_type, props[j].property_type)?
                    .is_some()
                {
                    edges[i].push(j);
                    edges[j].push(i);
                }
            }
        }
        let mut clusters: Vec<(Vec<usize>, HashSet<usize>)> = Vec::new();
        for i in 0..props.len() {
            let earliest = edges[i].iter().copied().filter(|&e| e < i).min();
            match earliest {
                None => clusters.push((vec![i], HashSet::from([i]))),
                Some(link) => {
                    let cluster = clusters
                        .iter_mut()
                        .find(|(_, set)| set.contains(&link))
                        .ok_or_else(|| {
                            ConvertError::internal("cluster link not found".to_string())
                        })?;
                    cluster.0.push(i);
                    cluster.1.insert(i);
                }
            }
        }
        Ok(clusters.into_iter().map(|(order, _)| order).collect())
    }

    /// Builds a variant type over a cluster's member types.
    fn derive_variant(
        &mut self,
        members: Vec<TypeRef>,
        common_type: TypeRef,
        related_field: StatementRef,
    ) -> Result<TypeRef> {
        Ok(self.module.add_type(TypeBody::Variant(VariantDesc {
            common_type,
            members,
            related_field,
        }))?)
    }

    fn common_merge(
        &mut self,
        id: StatementRef,
        base_cond: BaseConds,
        decl: &PropertyDecl,
        clusters: Vec<Vec<usize>>,
        mut props: Vec<PropertyDecl>,
        detected: &DetectedTypes,
    ) -> Result<Vec<PropertyDecl>> {
        let mut final_props = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            if cluster.len() == 1 {
                final_props.push(std::mem::take(&mut props[cluster[0]]));
                continue;
            }
            let mut common: Option<TypeRef> = None;
            for &index in &cluster {
                common = Some(match common {
                    None => props[index].property_type,
                    Some(prev) => self
                        .common_type_of(prev, props[index].property_type)?
                        .ok_or_else(|| {
                            ConvertError::internal(
                                "clustered types lost their common type".to_string(),
                            )
                        })?,
                });
            }
            let member_types: Vec<TypeRef> =
                cluster.iter().map(|&i| props[i].property_type).collect();
            let variant =
                self.derive_variant(member_types.clone(), common.expect("cluster"), id)?;
            let mut prop = PropertyDecl {
                name: decl.name,
                parent_format: decl.parent_format,
                property_type: variant,
                merge_mode: MergeMode::CommonType,
                getter_condition: base_cond.getter,
                setter_condition: base_cond.setter,
                ..PropertyDecl::default()
            };
            let allowed: HashSet<u64> = member_types.iter().map(|t| t.0).collect();
            self.common_merge_members(&mut prop, Some(&allowed), detected)?;
            for &index in &cluster {
                let strict = std::mem::take(&mut props[index]);
                let strict_ref = self.add_stmt(StatementBody::PropertyDecl(strict))?;
                prop.derived_from.push(strict_ref);
            }
            final_props.push(prop);
        }
        Ok(final_props)
    }

    fn uncommon_merge(
        &mut self,
        id: StatementRef,
        base_cond: BaseConds,
        decl: &mut PropertyDecl,
        final_props: Vec<PropertyDecl>,
        detected: &DetectedTypes,
    ) -> Result<()> {
        let member_types: Vec<TypeRef> =
            final_props.iter().map(|p| p.property_type).collect();
        let variant = self.derive_variant(member_types, TypeRef::NIL, id)?;
        let mut prop = PropertyDecl {
            name: decl.name,
            parent_format: decl.parent_format,
            property_type: variant,
            merge_mode: MergeMode::UncommonType,
            getter_condition: base_cond.getter,
            setter_condition: base_cond.setter,
            ..PropertyDecl::default()
        };
        self.common_merge_members(&mut prop, None, detected)?;
        for p in final_props {
            let r = self.add_stmt(StatementBody::PropertyDecl(p))?;
            prop.derived_from.push(r);
        }
        *decl = prop;
        Ok(())
    }

    /// Walks candidate positions across the (optionally cluster-restricted)
    /// detected types, picking the one real member per position and
    /// coalescing condition-only runs.
    fn common_merge_members(
        &mut self,
        prop: &mut PropertyDecl,
        allowed: Option<&HashSet<u64>>,
        detected: &DetectedTypes,
    ) -> Result<()> {
        let total = detected.merged.values().next().map(Vec::len).unwrap_or(0);
        let mut pending_getter: Vec<ExpressionRef> = Vec::new();
        let mut pending_setter: Vec<ExpressionRef> = Vec::new();
        for position in 0..total {
            let mut member: Option<PropertyMemberDecl> = None;
            let mut filler: Option<(ExpressionRef, ExpressionRef)> = None;
            for ty in &detected.order {
                if let Some(allowed) = allowed {
                    if !allowed.contains(&ty.0) {
                        continue;
                    }
                }
                match &detected.merged[&ty.0][position] {
                    MemberSlot::NoField { getter, setter } => match filler {
                        Some((g, s)) => {
                            if g != *getter || s != *setter {
                                return Err(ConvertError::internal(
                                    "inconsistent no-field condition across types".to_string(),
                                ));
                            }
                        }
                        None => filler = Some((*getter, *setter)),
                    },
                    MemberSlot::Member(m) => {
                        if member.is_some() {
                            return Err(ConvertError::internal(
                                "multiple members at one union position".to_string(),
                            ));
                        }
                        member = Some(m.clone());
                    }
                }
            }
            match member {
                None => {
                    let (getter, setter) = filler.ok_or_else(|| {
                        ConvertError::internal("empty union position".to_string())
                    })?;
                    pending_getter.push(getter);
                    pending_setter.push(setter);
                }
                Some(member) => {
                    if !pending_getter.is_empty() {
                        let filler = self.coalesced_member(
                            std::mem::take(&mut pending_getter),
                            std::mem::take(&mut pending_setter),
                        )?;
                        prop.members.push(filler);
                    }
                    let member = self.add_stmt(StatementBody::PropertyMemberDecl(member))?;
                    prop.members.push(member);
                }
            }
        }
        Ok(())
    }
}
