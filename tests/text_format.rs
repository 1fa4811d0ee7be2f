// Integration tests for the declaration reader and emitted text
//
// Compiles tests/graphs/*.sexp and compares against the canonical output

use std::fs;
use tfpartition::{compile_program, CompiledPartition, PartitionOptions};

fn compile_file(path: &str) -> Vec<CompiledPartition> {
    let source = fs::read_to_string(path).expect("Failed to read graph file");
    compile_program(&source, PartitionOptions::new())
        .expect("Failed to parse graph file")
        .into_iter()
        .map(|r| r.expect("Failed to compile graph"))
        .collect()
}

fn find<'a>(partitions: &'a [CompiledPartition], name: &str) -> &'a CompiledPartition {
    partitions
        .iter()
        .find(|p| p.name == name)
        .unwrap_or_else(|| panic!("no graph named {}", name))
}

#[test]
fn test_no_copy_file_compiles_without_warnings() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    assert_eq!(partitions.len(), 11);
    for partition in &partitions {
        assert!(
            partition.remarks.iter().all(|r| r.severity == tfpartition::core::Severity::Note),
            "unexpected warnings in {}: {:?}",
            partition.name,
            partition.remarks
        );
        assert_eq!(partition.stats.copies_inserted, 0, "{}", partition.name);
    }
}

#[test]
fn test_select_block_arguments_follow_first_use() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let expected = r#"--- Partition Accelerator Result: testSelect
accelerator @testSelect : (TensorHandle<Float>, TensorHandle<Bool>, TensorHandle<Float>) -> TensorHandle<Float> {
bb0(%0 : $TensorHandle<Float>, %1 : $TensorHandle<Bool>, %2 : $TensorHandle<Float>):
  %3 = builtin "__tfop_Add,$in,$in"(%0 : $TensorHandle<Float>, %0 : $TensorHandle<Float>) : $TensorHandle<Float>
  %4 = builtin "__tfop_Select,$in,$in,$in"(%1 : $TensorHandle<Bool>, %3 : $TensorHandle<Float>, %2 : $TensorHandle<Float>) : $TensorHandle<Float>
  %5 = builtin "__tfop_Mul,$in,$in"(%4 : $TensorHandle<Float>, %2 : $TensorHandle<Float>) : $TensorHandle<Float>
  return %5 : $TensorHandle<Float>
}
--- Partition Host Result: testSelect
  %h0 = "Argument"() : $TensorHandle<Bool> // conds1
  %h1 = "Argument"() : $TensorHandle<Float> // x1
  %h2 = "Argument"() : $TensorHandle<Float> // y1
  %h3 = "toDevice"(%h0 : $TensorHandle<Bool>) : $TensorHandle<Bool>
  %h4 = "toDevice"(%h1 : $TensorHandle<Float>) : $TensorHandle<Float>
  %h5 = "toDevice"(%h2 : $TensorHandle<Float>) : $TensorHandle<Float>
  %h6 = "toHost"(%5 : $TensorHandle<Float>) : $TensorHandle<Float>
"#;
    assert_eq!(find(&partitions, "testSelect").text, expected);
}

#[test]
fn test_convolution_attributes() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let expected = r#"--- Partition Accelerator Result: testConvolution
accelerator @testConvolution : (TensorHandle<Float>, TensorHandle<Float>) -> TensorHandle<Float> {
bb0(%0 : $TensorHandle<Float>, %1 : $TensorHandle<Float>):
  %2 = metatype $@thin Int32.Type
  %3 = integer_literal $Builtin.Int32, 1
  %4 = integer_literal $Builtin.Int32, 2
  %5 = integer_literal $Builtin.Int32, 3
  %6 = integer_literal $Builtin.Int32, 4
  %7 = string_literal utf8 "SAME"
  %8 = builtin "__tfop_Conv2D,$in,$in,strides$array,$elt,$elt,$elt,$elt,padding"(%0 : $TensorHandle<Float>, %1 : $TensorHandle<Float>, %2 : $@thin Int32.Type, %3 : $Builtin.Int32, %4 : $Builtin.Int32, %5 : $Builtin.Int32, %6 : $Builtin.Int32, %7 : $Builtin.RawPointer) : $TensorHandle<Float>
  return %8 : $TensorHandle<Float>
}
--- Partition Host Result: testConvolution
  %h0 = "Argument"() : $TensorHandle<Float> // x
  %h1 = "Argument"() : $TensorHandle<Float> // filter
  %h2 = "toDevice"(%h0 : $TensorHandle<Float>) : $TensorHandle<Float>
  %h3 = "toDevice"(%h1 : $TensorHandle<Float>) : $TensorHandle<Float>
  %h4 = "toHost"(%8 : $TensorHandle<Float>) : $TensorHandle<Float>
"#;
    assert_eq!(find(&partitions, "testConvolution").text, expected);
}

#[test]
fn test_constant_array() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let expected = r#"--- Partition Accelerator Result: testConstantArray
accelerator @testConstantArray : () -> TensorHandle<Float> {
bb0:
  %0 = metatype $@thin Float.Type
  %1 = metatype $@thin Double.Type
  %2 = float_literal $Builtin.FPIEEE64, 0x3FF0000000000000 // 1
  %3 = float_literal $Builtin.FPIEEE64, 0x4000000000000000 // 2
  %4 = metatype $@thin Int.Type
  %5 = integer_literal $Builtin.Int64, 2
  %6 = builtin "__tfop_Const,dtype,value$tensor,$elt,$elt,value$shape,$elt"(%0 : $@thin Float.Type, %1 : $@thin Double.Type, %2 : $Builtin.FPIEEE64, %3 : $Builtin.FPIEEE64, %4 : $@thin Int.Type, %5 : $Builtin.Int64) : $TensorHandle<Float>
  return %6 : $TensorHandle<Float>
}
--- Partition Host Result: testConstantArray
  %h0 = "toHost"(%6 : $TensorHandle<Float>) : $TensorHandle<Float>
"#;
    assert_eq!(find(&partitions, "testConstantArray").text, expected);
}

#[test]
fn test_multi_output_references_by_index() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let expected = r#"--- Partition Accelerator Result: testMultiOutputs
accelerator @testMultiOutputs : () -> () {
bb0:
  %0 = float_literal $Builtin.FPIEEE32, 0x00000000 // 0
  %1 = builtin "__tfop_Const,value"(%0 : $Builtin.FPIEEE32) : $TensorHandle<Float>
  %2 = integer_literal $Builtin.Int1, 0
  %3 = builtin "__tfop_Const,value"(%2 : $Builtin.Int1) : $TensorHandle<Bool>
  %4 = builtin "__tfop_Switch,$in,$in"(%1 : $TensorHandle<Float>, %3 : $TensorHandle<Bool>) : $(TensorHandle<Float>, TensorHandle<Float>)
  %5 = builtin "__tfop_Identity,$in"(%4#0 : $TensorHandle<Float>) : $TensorHandle<Float>
  %6 = builtin "__tfop_Identity,$in"(%4#1 : $TensorHandle<Float>) : $TensorHandle<Float>
  return
}
--- Partition Host Result: testMultiOutputs
"#;
    assert_eq!(find(&partitions, "testMultiOutputs").text, expected);
}

#[test]
fn test_loop_carried_value_stays_on_device() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let text = &find(&partitions, "rangeLiteral").text;
    assert!(text.contains(
        "  %2 = builtin \"__tfop_Merge,$in,$in\"(%1 : $TensorHandle<Float>, %5 : $TensorHandle<Float>) : $TensorHandle<Float>\n"
    ));
    assert!(text.contains("  %0 = float_literal $Builtin.FPIEEE32, 0x42040000 // 33\n"));
    assert!(text.contains("  return %5 : $TensorHandle<Float>\n"));
}

#[test]
fn test_sigmoid_returns_tuple_in_program_order() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let expected = r#"--- Partition Accelerator Result: testSigmoid
accelerator @testSigmoid : (TensorHandle<Float>, TensorHandle<Float>) -> (TensorHandle<Float>, TensorHandle<Float>) {
bb0(%0 : $TensorHandle<Float>, %1 : $TensorHandle<Float>):
  %2 = builtin "__tfop_Sigmoid,$in"(%0 : $TensorHandle<Float>) : $TensorHandle<Float>
  %3 = builtin "__tfop_Sigmoid,$in"(%1 : $TensorHandle<Float>) : $TensorHandle<Float>
  %4 = tuple (%3 : $TensorHandle<Float>, %2 : $TensorHandle<Float>)
  return %4 : $(TensorHandle<Float>, TensorHandle<Float>)
}
--- Partition Host Result: testSigmoid
  %h0 = "Argument"() : $TensorHandle<Float> // x
  %h1 = "Argument"() : $TensorHandle<Float> // y
  %h2 = "toDevice"(%h0 : $TensorHandle<Float>) : $TensorHandle<Float>
  %h3 = "toDevice"(%h1 : $TensorHandle<Float>) : $TensorHandle<Float>
  %h4 = "toHost"(%3 : $TensorHandle<Float>) : $TensorHandle<Float>
  %h5 = "toHost"(%2 : $TensorHandle<Float>) : $TensorHandle<Float>
"#;
    assert_eq!(find(&partitions, "testSigmoid").text, expected);
}

#[test]
fn test_reductions_feed_scalar_arithmetic() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let expected = r#"--- Partition Accelerator Result: testMeanMax
accelerator @testMeanMax : (TensorHandle<Float>) -> Builtin.FPIEEE32 {
bb0(%0 : $TensorHandle<Float>):
  %1 = builtin "__tfop_Mean,$in"(%0 : $TensorHandle<Float>) : $TensorHandle<Float>
  %2 = builtin "__tfop_Max,$in"(%0 : $TensorHandle<Float>) : $TensorHandle<Float>
  %3 = builtin "__tfop_TensorToScalar,$in"(%1 : $TensorHandle<Float>) : $Builtin.FPIEEE32
  %4 = builtin "__tfop_TensorToScalar,$in"(%2 : $TensorHandle<Float>) : $Builtin.FPIEEE32
  %5 = builtin "__tfop_Add,$in,$in"(%3 : $Builtin.FPIEEE32, %4 : $Builtin.FPIEEE32) : $Builtin.FPIEEE32
  return %5 : $Builtin.FPIEEE32
}
--- Partition Host Result: testMeanMax
  %h0 = "Argument"() : $TensorHandle<Float> // x
  %h1 = "toDevice"(%h0 : $TensorHandle<Float>) : $TensorHandle<Float>
  %h2 = "toHost"(%5 : $Builtin.FPIEEE32) : $Builtin.FPIEEE32
"#;
    assert_eq!(find(&partitions, "testMeanMax").text, expected);
}

#[test]
fn test_zero_tensors_materialise_each_constant() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let expected = r#"--- Partition Accelerator Result: testZeros
accelerator @testZeros : () -> TensorHandle<Float> {
bb0:
  %0 = metatype $@thin Float.Type
  %1 = metatype $@thin Float.Type
  %2 = float_literal $Builtin.FPIEEE32, 0x00000000 // 0
  %3 = float_literal $Builtin.FPIEEE32, 0x00000000 // 0
  %4 = metatype $@thin Int.Type
  %5 = integer_literal $Builtin.Int64, 1
  %6 = integer_literal $Builtin.Int64, 2
  %7 = builtin "__tfop_Const,dtype,value$tensor,$elt,$elt,value$shape,$elt,$elt"(%0 : $@thin Float.Type, %1 : $@thin Float.Type, %2 : $Builtin.FPIEEE32, %3 : $Builtin.FPIEEE32, %4 : $@thin Int.Type, %5 : $Builtin.Int64, %6 : $Builtin.Int64) : $TensorHandle<Float>
  %8 = metatype $@thin Float.Type
  %9 = metatype $@thin Float.Type
  %10 = float_literal $Builtin.FPIEEE32, 0x00000000 // 0
  %11 = float_literal $Builtin.FPIEEE32, 0x00000000 // 0
  %12 = metatype $@thin Int.Type
  %13 = integer_literal $Builtin.Int64, 1
  %14 = integer_literal $Builtin.Int64, 2
  %15 = builtin "__tfop_Const,dtype,value$tensor,$elt,$elt,value$shape,$elt,$elt"(%8 : $@thin Float.Type, %9 : $@thin Float.Type, %10 : $Builtin.FPIEEE32, %11 : $Builtin.FPIEEE32, %12 : $@thin Int.Type, %13 : $Builtin.Int64, %14 : $Builtin.Int64) : $TensorHandle<Float>
  %16 = builtin "__tfop_Add,$in,$in"(%7 : $TensorHandle<Float>, %15 : $TensorHandle<Float>) : $TensorHandle<Float>
  return %16 : $TensorHandle<Float>
}
--- Partition Host Result: testZeros
  %h0 = "toHost"(%16 : $TensorHandle<Float>) : $TensorHandle<Float>
"#;
    assert_eq!(find(&partitions, "testZeros").text, expected);
}

#[test]
fn test_empty_tensor_with_typed_shape() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let expected = r#"--- Partition Accelerator Result: testEmptyScalarsArray
accelerator @testEmptyScalarsArray : () -> () {
bb0:
  %0 = metatype $@thin Int32.Type
  %1 = metatype $@thin Int32.Type
  %2 = integer_literal $Builtin.Int32, 0
  %3 = integer_literal $Builtin.Int32, 20
  %4 = integer_literal $Builtin.Int32, 30
  %5 = metatype $@thin Int32.Type
  %6 = builtin "__tfop_Const,value$tensor,value$shape,$elt,$elt,$elt,dtype"(%0 : $@thin Int32.Type, %1 : $@thin Int32.Type, %2 : $Builtin.Int32, %3 : $Builtin.Int32, %4 : $Builtin.Int32, %5 : $@thin Int32.Type) : $TensorHandle<Int32>
  %7 = builtin "__tfop_Add,$in,$in"(%6 : $TensorHandle<Int32>, %6 : $TensorHandle<Int32>) : $TensorHandle<Int32>
  return
}
--- Partition Host Result: testEmptyScalarsArray
"#;
    assert_eq!(find(&partitions, "testEmptyScalarsArray").text, expected);
}

#[test]
fn test_loop_condition_stays_on_device() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let expected = r#"--- Partition Accelerator Result: test75494462
accelerator @test75494462 : () -> TensorHandle<Float> {
bb0:
  %0 = float_literal $Builtin.FPIEEE32, 0x3F800000 // 1
  %1 = builtin "__tfop_Const,value"(%0 : $Builtin.FPIEEE32) : $TensorHandle<Float>
  %2 = integer_literal $Builtin.Int32, 1
  %3 = builtin "__tfop_Const,value"(%2 : $Builtin.Int32) : $TensorHandle<Int32>
  %4 = builtin "__tfop_Merge,$in,$in"(%1 : $TensorHandle<Float>, %8 : $TensorHandle<Float>) : $TensorHandle<Float>
  %5 = builtin "__tfop_Merge,$in,$in"(%3 : $TensorHandle<Int32>, %11 : $TensorHandle<Int32>) : $TensorHandle<Int32>
  %6 = float_literal $Builtin.FPIEEE32, 0x3F800000 // 1
  %7 = builtin "__tfop_Const,value"(%6 : $Builtin.FPIEEE32) : $TensorHandle<Float>
  %8 = builtin "__tfop_Add,$in,$in"(%4 : $TensorHandle<Float>, %7 : $TensorHandle<Float>) : $TensorHandle<Float>
  %9 = integer_literal $Builtin.Int32, 1
  %10 = builtin "__tfop_Const,value"(%9 : $Builtin.Int32) : $TensorHandle<Int32>
  %11 = builtin "__tfop_Add,$in,$in"(%5 : $TensorHandle<Int32>, %10 : $TensorHandle<Int32>) : $TensorHandle<Int32>
  %12 = integer_literal $Builtin.Int32, 5
  %13 = builtin "__tfop_Const,value"(%12 : $Builtin.Int32) : $TensorHandle<Int32>
  %14 = builtin "__tfop_Less,$in,$in"(%11 : $TensorHandle<Int32>, %13 : $TensorHandle<Int32>) : $TensorHandle<Bool>
  %15 = builtin "__tfop_LoopCond,$in"(%14 : $TensorHandle<Bool>) : $TensorHandle<Bool>
  return %8 : $TensorHandle<Float>
}
--- Partition Host Result: test75494462
  %h0 = "toHost"(%8 : $TensorHandle<Float>) : $TensorHandle<Float>
"#;
    assert_eq!(find(&partitions, "test75494462").text, expected);
}

#[test]
fn test_scalar_round_trip_through_tensor() {
    let partitions = compile_file("tests/graphs/no_copy.sexp");
    let expected = r#"--- Partition Accelerator Result: tensorToScalarToTensor
accelerator @tensorToScalarToTensor : (TensorHandle<Int32>) -> TensorHandle<Int32> {
bb0(%0 : $TensorHandle<Int32>):
  %1 = builtin "__tfop_Mean,$in"(%0 : $TensorHandle<Int32>) : $TensorHandle<Int32>
  %2 = builtin "__tfop_TensorToScalar,$in"(%1 : $TensorHandle<Int32>) : $Builtin.Int32
  %3 = builtin "__tfop_ScalarToTensor,$in"(%2 : $Builtin.Int32) : $TensorHandle<Int32>
  %4 = builtin "__tfop_Add,$in,$in"(%3 : $TensorHandle<Int32>, %3 : $TensorHandle<Int32>) : $TensorHandle<Int32>
  return %4 : $TensorHandle<Int32>
}
--- Partition Host Result: tensorToScalarToTensor
  %h0 = "Argument"() : $TensorHandle<Int32> // a
  %h1 = "toDevice"(%h0 : $TensorHandle<Int32>) : $TensorHandle<Int32>
  %h2 = "toHost"(%4 : $TensorHandle<Int32>) : $TensorHandle<Int32>
"#;
    assert_eq!(find(&partitions, "tensorToScalarToTensor").text, expected);
}

#[test]
fn test_parse_error_aborts_program() {
    let err = compile_program("(graph g (x Argument", PartitionOptions::new()).unwrap_err();
    assert!(matches!(err, tfpartition::PartitionError::Parse(_)));
}
